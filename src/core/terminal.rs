use console::{Emoji, style};

use crate::core::broadcast::{ConnectionStatus, Progress, StatusUpdate};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static PHONE: Emoji<'_, '_> = Emoji("📱 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

enum GuideLine {
    Command(String, String),
    Status(String, String),
    Text(String),
    Blank,
}

/// A titled block of help rows, printed with aligned columns.
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines
            .push(GuideLine::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(GuideLine::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Text(text.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    fn command_width(&self) -> usize {
        self.lines
            .iter()
            .filter_map(|line| match line {
                GuideLine::Command(name, _) => Some(name.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn render(&self) -> Vec<String> {
        let width = self.command_width();
        let mut out = vec![format!("{}", style(&self.title).bold().underlined())];
        for line in &self.lines {
            out.push(match line {
                GuideLine::Command(name, description) => format!(
                    "  {}  {}",
                    style(format!("{:<width$}", name, width = width)).cyan(),
                    description
                ),
                GuideLine::Status(label, value) => {
                    format!("  {} {}: {}", GEAR, style(label).bold(), value)
                }
                GuideLine::Text(text) => format!("  {}", text),
                GuideLine::Blank => String::new(),
            });
        }
        out
    }

    pub fn print(&self) {
        println!();
        for line in self.render() {
            println!("{}", line);
        }
    }
}

/// Renders an engine status line the way the CLI shows it.
pub fn print_engine_status(update: &StatusUpdate) {
    match update.status {
        ConnectionStatus::Connected | ConnectionStatus::Finished => print_success(&update.message),
        ConnectionStatus::Error => print_error(&update.message),
        ConnectionStatus::Disconnected => print_warn(&update.message),
        ConnectionStatus::Running => println!("{} {}", ROCKET, style(&update.message).bold()),
        ConnectionStatus::Qr => println!("{} {}", PHONE, style(&update.message).bold()),
        ConnectionStatus::Idle | ConnectionStatus::Connecting => print_info(&update.message),
    }
}

pub fn format_progress(progress: &Progress) -> String {
    format!(
        "[{}/{}] {}",
        progress.current, progress.total, progress.current_number
    )
}

pub fn print_progress(progress: &Progress) {
    println!("  {}", style(format_progress(progress)).dim());
}

pub fn print_banner() {
    let lines: &[&str] = &[
        " _     _           _       ",
        "| |__ | | __ _ ___| |_ _ __",
        "| '_ \\| |/ _` / __| __| '__|",
        "| |_) | | (_| \\__ \\ |_| |  ",
        "|_.__/|_|\\__,_|___/\\__|_|  ",
    ];

    // Gradient: #22c55e → #10b981 → #22d3ee (diagonal top-left → bottom-right)
    let stops: [(u8, u8, u8); 3] = [(34, 197, 94), (16, 185, 129), (34, 211, 238)];
    let max_w = 28u32;
    let max_d = max_w + 4 * 10;

    println!();
    for (y, line) in lines.iter().enumerate() {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let d = ((x as u32 + y as u32 * 10) * 1000 / max_d).min(1000);
            let (r, g, b) = if d <= 500 {
                lerp_color(stops[0], stops[1], d * 2)
            } else {
                lerp_color(stops[1], stops[2], (d - 500) * 2)
            };
            print!("\x1b[38;2;{};{};{}m{}", r, g, b, ch);
        }
        println!();
    }
    print!("\x1b[0m");

    println!("\x1b[38;2;34;211;238mOne message, every number, paced.\x1b[0m\n");
}

fn lerp_color(a: (u8, u8, u8), b: (u8, u8, u8), t: u32) -> (u8, u8, u8) {
    let r = (a.0 as u32 * (1000 - t) + b.0 as u32 * t) / 1000;
    let g = (a.1 as u32 * (1000 - t) + b.1 as u32 * t) / 1000;
    let b_val = (a.2 as u32 * (1000 - t) + b.2 as u32 * t) / 1000;
    (r as u8, g as u8, b_val as u8)
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("Thanks for using blastr. See you next time!")
            .bold()
            .cyan()
    );
}
