use crate::rebase::{OutcomeKind, ResourceId};
use console::{style, Emoji, StyledObject};
use std::fmt::Display;

/// Terminal rendering shared by the commands and the console notifier
pub struct Output;

impl Output {
    pub fn success<T: Display>(message: T) {
        Self::marked(style(Marks::SUCCESS).green(), message);
    }

    pub fn error<T: Display>(message: T) {
        Self::marked(style(Marks::ERROR).red(), message);
    }

    pub fn warning<T: Display>(message: T) {
        Self::marked(style(Marks::WARNING).yellow(), message);
    }

    pub fn info<T: Display>(message: T) {
        Self::marked(style(Marks::INFO).cyan(), message);
    }

    /// Something is about to happen
    pub fn progress<T: Display>(message: T) {
        Self::marked(style(Marks::ARROW).cyan(), message);
    }

    pub fn sub_item<T: Display>(message: T) {
        println!("  {} {}", style(Marks::ARROW).dim(), message);
    }

    pub fn bullet<T: Display>(message: T) {
        println!("  {} {}", style(Marks::BULLET).dim(), message);
    }

    pub fn section<T: Display>(title: T) {
        println!("\n{}", style(title).bold().underlined());
    }

    pub fn tip<T: Display>(message: T) {
        println!("{} {}", style("TIP:").cyan(), style(message).dim());
    }

    pub fn next_steps(steps: &[&str]) {
        println!();
        Self::tip("Next steps:");
        for step in steps {
            Self::bullet(step);
        }
    }

    /// A follow-up the user can take, with the command that does it
    pub fn action<L: Display, C: Display>(label: L, command: C) {
        println!("  {} {}", style(format!("{label}:")).dim(), style(command).yellow());
    }

    /// One repository of the family and how far its rebase got.
    /// `None` means it was not attempted yet.
    pub fn repository(id: &ResourceId, outcome: Option<OutcomeKind>, stopped_here: bool) {
        let status = match outcome {
            Some(OutcomeKind::Success) => style(OutcomeKind::Success.to_string()).green(),
            Some(OutcomeKind::Suspended) => style(OutcomeKind::Suspended.to_string()).yellow(),
            Some(OutcomeKind::Error) => style(OutcomeKind::Error.to_string()).red(),
            Some(OutcomeKind::NotStarted) => style(OutcomeKind::NotStarted.to_string()).dim(),
            None => style("pending".to_string()).dim(),
        };

        if stopped_here {
            Self::warning(format!("{id}: {status} (stopped here)"));
        } else {
            Self::sub_item(format!("{id}: {status}"));
        }
    }

    fn marked<T: Display>(mark: StyledObject<Emoji<'static, 'static>>, message: T) {
        println!("{mark} {message}");
    }
}

/// Status marks with plain-text fallbacks for terminals without unicode
struct Marks;

impl Marks {
    const SUCCESS: Emoji<'static, 'static> = Emoji("✓", "OK");
    const ERROR: Emoji<'static, 'static> = Emoji("✗", "ERROR");
    const WARNING: Emoji<'static, 'static> = Emoji("⚠", "WARNING");
    const INFO: Emoji<'static, 'static> = Emoji("ℹ", "INFO");
    const ARROW: Emoji<'static, 'static> = Emoji("→", "->");
    const BULLET: Emoji<'static, 'static> = Emoji("•", "*");
}
