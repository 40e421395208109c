mod config_cmd;
mod export_cmd;
mod meter;
mod reading;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use export_cmd::ExportCommand;
pub use meter::MeterCommand;
pub use reading::ReadingCommand;
pub use sync_cmd::SyncCommand;

use clap::ValueEnum;
use std::io::{self, Write};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Asks a yes/no question on stdin. Anything but "y" counts as no.
fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("Lader", 10), "Lader");
        assert_eq!(truncate("Varmepumpe i kjelleren", 10), "Varmepu...");
        assert_eq!(truncate("ææææææææææææ", 6), "æææ...");
    }
}
