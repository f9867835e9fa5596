use crate::model::{BloomLevel, GeneratedTest, TosBlueprint};
use crate::storage::QualityAggregates;

/// Terminal preview of the distribution matrix.
pub fn print_blueprint(bp: &TosBlueprint) {
    eprintln!("\n{} | {} | {}", bp.course, bp.period, bp.school_year);
    eprintln!("Total items: {}\n", bp.total_items);

    eprint!("{:<24}", "Topic");
    for level in BloomLevel::ALL {
        eprint!("{:>6}", short(level));
    }
    eprintln!("{:>7}", "Total");

    for row in &bp.matrix {
        eprint!("{:<24}", truncate(&row.topic, 23));
        for cell in &row.cells {
            eprint!("{:>6}", cell.items.len());
        }
        eprintln!("{:>7}", row.total);
    }

    eprint!("{:<24}", "Total");
    for t in bp.level_totals {
        eprint!("{:>6}", t);
    }
    eprintln!("{:>7}", bp.total_items);
}

pub fn print_test_summary(test: &GeneratedTest) {
    eprintln!(
        "\n{}  ({} items, {} points)",
        test.title,
        test.items.len(),
        test.total_points()
    );
    for item in &test.items {
        eprintln!(
            "  {:>3}. [{:<10}] {}",
            item.number,
            item.bloom.as_str(),
            truncate(&item.text, 60)
        );
    }
    for w in &test.warnings {
        eprintln!("  ⚠️  {}", w);
    }
}

pub fn print_quality(agg: &QualityAggregates) {
    eprintln!("\nClassified questions: {}", agg.total);
    eprintln!("Flagged for review:   {}", agg.flagged);
    eprintln!("Mean confidence:      {:.2}", agg.mean_confidence);
    eprintln!("Mean quality:         {:.2}", agg.mean_quality);
    if !agg.per_bloom.is_empty() {
        eprintln!("By level:");
        for (bloom, n) in &agg.per_bloom {
            eprintln!("  {:<12} {}", bloom, n);
        }
    }
}

fn short(level: BloomLevel) -> &'static str {
    match level {
        BloomLevel::Remember => "Rem",
        BloomLevel::Understand => "Und",
        BloomLevel::Apply => "App",
        BloomLevel::Analyze => "Ana",
        BloomLevel::Evaluate => "Eva",
        BloomLevel::Create => "Cre",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ababababab", 5), "abab…");
    }
}
