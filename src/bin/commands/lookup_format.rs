use maxlon::lens::lookup::LookupResult;
use maxlon::lens::utils::{format_elapsed, truncate_name, OutputFormat, DEFAULT_NAME_MAX_LEN};
use std::time::Duration;
use tabled::settings::Style;
use tabled::Table;

/// CIDRs listed in table mode before the list is cut short
const MAX_LISTED_CIDRS: usize = 20;

/// Print one lookup result; `source` names where the answer came from and
/// `round_trip` is the client-side time including the daemon exchange
pub(crate) fn print_lookup(
    result: &LookupResult,
    output_format: OutputFormat,
    source: &str,
    round_trip: Option<Duration>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json | OutputFormat::JsonPretty | OutputFormat::JsonLine => {
            super::print_json(result, output_format)?;
        }
        OutputFormat::Psv => print_psv(result),
        OutputFormat::Table | OutputFormat::Markdown => print_table(result, output_format),
    }

    if !output_format.is_json() {
        eprintln!(
            "query time: {} ({source})",
            format_elapsed(Duration::from_secs_f64(result.query_time.max(0.0)))
        );
        if let Some(total) = round_trip {
            eprintln!("total time: {} (client + {source})", format_elapsed(total));
        }
    }
    Ok(())
}

fn print_table(result: &LookupResult, output_format: OutputFormat) {
    let Some(record) = &result.record else {
        println!("no network found for {}", result.ip);
        return;
    };

    let mut display = record.clone();
    display.as_name = truncate_name(&record.as_name, DEFAULT_NAME_MAX_LEN);
    let mut table = Table::new(vec![display]);
    match output_format {
        OutputFormat::Markdown => table.with(Style::markdown()),
        _ => table.with(Style::rounded()),
    };
    println!("{table}");

    if !record.has_asn() {
        return;
    }
    println!();
    println!(
        "AS{} announces {} network(s):",
        record.asn,
        result.asn_cidrs.len()
    );
    for cidr in result.asn_cidrs.iter().take(MAX_LISTED_CIDRS) {
        println!("  {cidr}");
    }
    if result.asn_cidrs.len() > MAX_LISTED_CIDRS {
        println!(
            "  ... and {} more (use --format json for the full list)",
            result.asn_cidrs.len() - MAX_LISTED_CIDRS
        );
    }
}

fn print_psv(result: &LookupResult) {
    println!("ip|network|asn|country_code|country_name|as_name|asn_cidrs");
    match &result.record {
        Some(r) => {
            let cidrs: Vec<String> = result.asn_cidrs.iter().map(|c| c.to_string()).collect();
            println!(
                "{}|{}|{}|{}|{}|{}|{}",
                result.ip,
                r.network,
                r.asn,
                r.country_code,
                r.country_name,
                r.as_name,
                cidrs.join(",")
            );
        }
        None => println!("{}||||||", result.ip),
    }
}
