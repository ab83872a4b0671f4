//! Terminal rendering of council events.

use colored::{ColoredString, Colorize};
use council_core::{CouncilCallback, CouncilEvent, PersonaId};

pub const RULE_WIDTH: usize = 70;

/// Create a callback that prints council events to the console.
pub fn console_callback() -> CouncilCallback {
    Box::new(move |event| match event {
        CouncilEvent::ActivatePersona(persona) => {
            println!("{} {}", "▶".bright_cyan(), persona_label(persona).bold());
        }
        CouncilEvent::AppendCaption { persona, text } => {
            if persona == PersonaId::User {
                println!("{} {}", "▷".dimmed(), "You".dimmed());
            }
            for line in textwrap(&text, RULE_WIDTH - 4).lines() {
                println!("  {}", line);
            }
        }
        CouncilEvent::Progress { index, total } => {
            println!("  {}", format!("[{}/{}]", index + 1, total).dimmed());
            println!();
        }
        CouncilEvent::ClearHighlight => {}
        CouncilEvent::SessionFinished => {
            println!("{}", "─".repeat(RULE_WIDTH).dimmed());
        }
        CouncilEvent::Error(message) => {
            eprintln!("{} {}", "Agent error:".red().bold(), message);
        }
    })
}

pub fn persona_label(persona: PersonaId) -> ColoredString {
    let label = persona.label();
    match persona {
        PersonaId::Intuition => label.bright_magenta(),
        PersonaId::Reason => label.bright_blue(),
        PersonaId::Fear => label.bright_red(),
        PersonaId::Facts => label.bright_white(),
        PersonaId::Heart => label.red(),
        PersonaId::Caution => label.yellow(),
        PersonaId::Optimist => label.bright_yellow(),
        PersonaId::Creator => label.bright_green(),
        PersonaId::Guide => label.cyan(),
        PersonaId::User => label.dimmed(),
    }
}

pub fn banner(title: &str) {
    println!();
    println!("{}", "═".repeat(RULE_WIDTH).bright_blue());
    println!("{}", format!("  {}", title).bright_blue().bold());
    println!("{}", "═".repeat(RULE_WIDTH).bright_blue());
    println!();
}

/// Greedy word wrap.
pub fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if line_len > 0 && line_len + word_len + 1 > width {
            result.push('\n');
            line_len = 0;
        }
        if line_len > 0 {
            result.push(' ');
            line_len += 1;
        }
        result.push_str(word);
        line_len += word_len;
    }

    result
}
