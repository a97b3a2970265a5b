//! Output formatting utilities for CLI commands

use cadence_gpu::ActivityRow;
use cadence_shared::types::identity::TaskEdge;
use cadence_shared::types::profile::TimerRow;
use colored::Colorize;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print section header
pub fn header(title: &str) {
    println!("\n{}", title.bold().underline());
}

fn ms(ns: u64) -> String {
    format!("{:.3}", ns as f64 / 1_000_000.0)
}

/// Print timer statistics, largest total first
pub fn timer_table(rows: &[TimerRow]) {
    println!(
        "{:<40} {:>7} {:>7} {:>12} {:>12}",
        "identity".bold(),
        "calls".bold(),
        "yields".bold(),
        "total ms".bold(),
        "mean ms".bold()
    );
    for row in rows {
        println!(
            "{:<40} {:>7} {:>7} {:>12} {:>12.3}",
            truncate(&row.id.to_string(), 40),
            row.stats.calls,
            row.stats.yields,
            ms(row.stats.total_ns),
            row.stats.mean_ns() / 1_000_000.0
        );
    }
}

/// Print spawn edges
pub fn task_graph(edges: &[TaskEdge]) {
    for edge in edges {
        println!(
            "  {} {} {} ({})",
            edge.parent.to_string().cyan(),
            "→".dimmed(),
            edge.child.to_string().cyan(),
            edge.identity
        );
    }
}

/// Print activity buckets in key order
pub fn activity_table(rows: &[ActivityRow]) {
    println!(
        "{:<40} {:>7} {:>12} {:>12} {:>12}  {}",
        "resource".bold(),
        "count".bold(),
        "total ms".bold(),
        "min ms".bold(),
        "max ms".bold(),
        "names".bold()
    );
    for row in rows {
        let names: Vec<&str> = row.stats.names.iter().map(String::as_str).collect();
        println!(
            "{:<40} {:>7} {:>12} {:>12} {:>12}  {}",
            row.key.to_string(),
            row.stats.count,
            ms(row.stats.total_ns),
            ms(row.stats.min_ns),
            ms(row.stats.max_ns),
            names.join(",")
        );
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let tail: String = s.chars().rev().take(width - 1).collect::<Vec<_>>().into_iter().rev().collect();
        format!("…{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_tail() {
        assert_eq!(truncate("short", 10), "short");
        let long = truncate("crate::module::{{closure}}", 10);
        assert_eq!(long.chars().count(), 10);
        assert!(long.ends_with("closure}}"));
    }
}
