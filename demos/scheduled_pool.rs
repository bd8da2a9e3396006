use std::time::Duration;

use anyhow::{Context, bail};
use rhopper::config::PoolSettings;
use rhopper::session::{
    ConnectionSecurityOptions, ScheduleConfig, SessionBatch, SessionPool, TimeUnit,
};
use serde::Deserialize;

/// `{"batch": {...}, "schedule": {...}, "settings": {...}}`
#[derive(Deserialize)]
struct Request {
    batch: SessionBatch,
    schedule: Option<ScheduleConfig>,
    #[serde(default)]
    settings: PoolSettings,
}

fn usage() -> ! {
    eprintln!("usage: scheduled_pool <request.json> [--run-secs N] [--secure]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else { usage() };
    let mut run_secs = 120;
    let mut secure = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--run-secs" => {
                run_secs = args
                    .next()
                    .context("--run-secs needs a value")?
                    .parse()
                    .context("--run-secs must be a number")?;
            }
            "--secure" => secure = true,
            other => bail!("unknown argument '{other}'"),
        }
    }

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let request: Request =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let security = if secure {
        ConnectionSecurityOptions::secure_default()
    } else {
        ConnectionSecurityOptions::legacy_compatible()
    };
    let pool = SessionPool::over_ssh(security, request.settings);

    let summaries = pool.connect(request.batch).await?;
    for summary in &summaries {
        println!(
            "{}:{} connected={}",
            summary.host, summary.port, summary.connected
        );
    }
    if pool.is_empty().await {
        bail!("no session could be established");
    }

    let schedule = request.schedule.unwrap_or(ScheduleConfig {
        initial_delay: 0,
        period: 60,
        time_unit: TimeUnit::Seconds,
    });
    println!("{}", pool.configure_schedule(schedule).await?);

    tokio::time::sleep(Duration::from_secs(run_secs)).await;

    for status in pool.list().await {
        println!(
            "{} {}:{} connected={}",
            status.id, status.host, status.tunnel_port, status.connected
        );
    }
    println!("{}", pool.stop().await?);
    Ok(())
}
