use colored::*;
use std::io::Write;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.chars().count()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
    let _ = std::io::stdout().flush();
}

/// Aligned `label: value` line for status listings.
pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("{:<20} {}", format!("{}:", label).bold(), value);
}

/// Green when the bot likes someone, red when it doesn't.
pub fn sentiment_text(score: f64) -> ColoredString {
    let text = format!("{:+.2}", score);
    if score > 2.0 {
        text.green()
    } else if score < -2.0 {
        text.red()
    } else {
        text.normal()
    }
}
