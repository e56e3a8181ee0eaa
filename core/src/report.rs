//! Console rendering of ranked results and statistics.

use crate::rank::RankedResult;
use crate::stats::Statistics;
use std::fmt::{Display, Write};

const WIDTH: usize = 80;

fn or_na<T: Display>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn banner(out: &mut String, title: &str) {
    let rule = "=".repeat(WIDTH);
    let _ = writeln!(out, "\n{rule}\n{title:^width$}\n{rule}", width = WIDTH);
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

pub fn render_results(results: &[RankedResult], detailed: bool) -> String {
    let mut out = String::new();
    banner(&mut out, "TOP FILTERED RESULTS");
    for r in results {
        let m = &r.metadata;
        let start = m.start_date.as_deref().map_or_else(|| "N/A".to_string(), |s| s.chars().take(10).collect());
        let _ = writeln!(out, "\n#{} - similarity {:.4} (record {})", r.rank, r.score, r.global_index);
        let _ = writeln!(out, "Reference:   {}", or_na(&m.offer_reference));
        let _ = writeln!(out, "Title:       {}", or_na(&m.title));
        let _ = writeln!(out, "Company:     {}", or_na(&m.company));
        let _ = writeln!(out, "Location:    {}, {}", or_na(&m.city), or_na(&m.country));
        let _ = writeln!(out, "Sector:      {}", or_na(&m.sector));
        let _ = writeln!(out, "Duration:    {} months", or_na(&m.duration_months));
        let _ = writeln!(out, "Allowance:   {} EUR/month", or_na(&m.salary_eur));
        let _ = writeln!(out, "Start date:  {start}");
        let _ = writeln!(out, "Competition: {} ({}%)", or_na(&m.competition_level), or_na(&m.application_rate));
        let _ = writeln!(out, "Applicants:  {} | Views: {}", or_na(&m.candidates_count), or_na(&m.views_count));
        let _ = writeln!(out, "Contact:     {}", or_na(&m.contact_email));
        if detailed {
            let _ = writeln!(out, "\nChunk type:  {}", or_na(&m.chunk_type));
            let _ = writeln!(out, "Chunk id:    {}", or_na(&m.chunk_id));
        }
        let _ = writeln!(out, "{}", "-".repeat(WIDTH));
    }
    out
}

pub fn render_statistics(stats: &Statistics) -> String {
    let mut out = String::new();
    banner(&mut out, "RESULT STATISTICS");
    let _ = writeln!(out, "\nTotal results: {}", stats.total_results);

    let _ = writeln!(out, "\nBy country:");
    for (country, count) in stats.countries.entries().iter().take(5) {
        let _ = writeln!(out, "   - {country}: {count} offers");
    }
    let _ = writeln!(out, "\nBy sector:");
    for (sector, count) in stats.sectors.entries().iter().take(3) {
        let _ = writeln!(out, "   - {}: {count} offers", truncate(sector, 50));
    }
    let _ = writeln!(out, "\nTop companies:");
    for (company, count) in stats.top_companies.entries() {
        let _ = writeln!(out, "   - {company}: {count} offers");
    }

    let d = &stats.duration;
    let _ = writeln!(out, "\nMission duration:\n   - min: {} months\n   - max: {} months\n   - avg: {:.1} months", d.min, d.max, d.avg);
    let s = &stats.salary;
    let _ = writeln!(out, "\nMonthly allowance:\n   - min: {} EUR\n   - max: {} EUR\n   - avg: {:.0} EUR", s.min, s.max, s.avg);

    let _ = writeln!(out, "\nCompetition level:");
    for (level, count) in stats.competition.entries() {
        let _ = writeln!(out, "   - {level}: {count} offers");
    }
    let _ = writeln!(out, "{}", "=".repeat(WIDTH));
    out
}
