use console::Style;
use nocturne_core::reduce::{NightStatus, NightSummary, UnitOutcome};

struct Styles {
    title: Style,
    label: Style,
    value: Style,
    ok: Style,
    skipped: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            ok: Style::new().green(),
            skipped: Style::new().yellow(),
        }
    }
}

pub fn print_night_summary(summary: &NightSummary) {
    let s = Styles::new();

    println!(
        "  {} {}",
        s.title
            .apply_to(format!("{} {}", summary.telescope, summary.date.format("%Y%m%d"))),
        match summary.status {
            NightStatus::Completed => s.ok.apply_to("reduced".to_string()),
            NightStatus::MissingNightFolder => s.skipped.apply_to("no night folder".to_string()),
            NightStatus::NoScienceFrames => s.skipped.apply_to("no science frames".to_string()),
        }
    );

    for unit in &summary.units {
        match unit {
            UnitOutcome::Reduced {
                config_str,
                filter,
                written,
                kept_existing,
            } => {
                let mut line = format!("{written} written");
                if *kept_existing > 0 {
                    line.push_str(&format!(", {kept_existing} kept"));
                }
                println!(
                    "    {:<12}{:<44}{}",
                    s.label.apply_to(filter),
                    s.label.apply_to(config_str),
                    s.value.apply_to(line)
                );
            }
            UnitOutcome::Skipped {
                config_str,
                filter,
                reason,
            } => {
                println!(
                    "    {:<12}{:<44}{}",
                    s.label.apply_to(filter),
                    s.label.apply_to(config_str),
                    s.skipped.apply_to(format!("skipped: {reason}"))
                );
            }
        }
    }
}

pub fn print_range_totals(summaries: &[NightSummary]) {
    let s = Styles::new();
    let written: usize = summaries.iter().map(NightSummary::written).sum();
    let skipped: usize = summaries.iter().map(NightSummary::skipped_units).sum();
    let empty = summaries
        .iter()
        .filter(|n| n.status != NightStatus::Completed)
        .count();

    println!();
    println!(
        "  {} {} nights, {} reduced frames, {} skipped units, {} empty nights",
        s.title.apply_to("Total:"),
        s.value.apply_to(summaries.len().to_string()),
        s.ok.apply_to(written.to_string()),
        s.skipped.apply_to(skipped.to_string()),
        s.label.apply_to(empty.to_string())
    );
}
