//! `upwatchd stats` output.

use chrono::{DateTime, Utc};

use upwatch_state::{MonitorStore, RecordQuery, StateStore};
use upwatch_stats::{current_outage_minutes, report, AvailabilityStats, Incident, Period};

pub fn print_stats(
    store: &StateStore,
    endpoint_id: Option<&str>,
    period: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let period: Period = period.parse()?;
    let (start, end) = period.range(now);

    match endpoint_id {
        Some(id) => {
            let Some(endpoint) = store.get_endpoint(id)? else {
                anyhow::bail!("unknown endpoint: {id}");
            };
            println!("{} - {} (last {period})", endpoint.display_name(), endpoint.url);
            println!("status: {}", endpoint.last_status);

            let records =
                store.query_records(&RecordQuery::between(start, now).for_endpoint(id))?;
            if let Some(minutes) = current_outage_minutes(&endpoint, &records, now) {
                println!("down for {minutes} min");
            }
            print_availability(&report::endpoint_stats(store, id, start, end)?);

            println!();
            println!("response times (successful checks, per day):");
            for point in report::response_times(store, id, start, end)? {
                println!(
                    "  {}  avg {:>8.2} ms  max {:>8.2} ms  min {:>8.2} ms",
                    point.date, point.avg_ms, point.max_ms, point.min_ms
                );
            }
        }
        None => {
            let global = report::global_stats(store, start, end)?;
            println!("all endpoints (last {period})");
            println!(
                "endpoints: {} total, {} active, {} up, {} down",
                global.total_endpoints,
                global.active_endpoints,
                global.up_endpoints,
                global.down_endpoints
            );
            print_availability(&global.stats);
        }
    }

    println!();
    print_incidents(&report::incidents(store, endpoint_id, start, end)?);
    Ok(())
}

fn print_availability(stats: &AvailabilityStats) {
    println!(
        "uptime: {:.2}% ({} of {} checks up)",
        stats.uptime_pct, stats.success_count, stats.total_checks
    );
    if let (Some(avg), Some(max)) = (stats.avg_response_time_ms, stats.max_response_time_ms) {
        println!("response time: avg {avg:.2} ms, max {max:.2} ms");
    }
    println!(
        "incidents: {}, downtime {} min, longest outage {} min",
        stats.incident_count, stats.total_downtime_minutes, stats.longest_outage_minutes
    );
}

fn print_incidents(incidents: &[Incident]) {
    if incidents.is_empty() {
        println!("no incidents");
        return;
    }
    println!("incidents:");
    for incident in incidents {
        println!(
            "  {}  {} → {}  {} min, {} failed checks",
            incident.endpoint_id,
            incident.start.format("%Y-%m-%d %H:%M"),
            incident.end.format("%Y-%m-%d %H:%M"),
            incident.duration_minutes,
            incident.record_count
        );
        for message in &incident.error_messages {
            println!("      {message}");
        }
    }
}
