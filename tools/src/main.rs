//! alert-monitor: headless front end for the fraud watch core.
//!
//! Usage:
//!   alert-monitor score [--config watch.json] [--seed 42]   < profiles.jsonl
//!   alert-monitor watch [--config watch.json] [--endpoint ws://host:9099/ws/notifications]
//!
//! score: one contract profile per stdin line, one assessment per stdout line.
//! watch: attach to the feed and print bus events as JSON lines. Stdin
//!        accepts `reconnect`, `stats`, `alerts`, `quit`; EOF also quits.

use anyhow::{bail, Result};
use fraudwatch_core::{
    bus::AlertBus,
    config::WatchConfig,
    rng::ScoreRng,
    scoring::{ContractFinancialProfile, FraudAssessment, ScoringEngine},
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Instant;

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoredLine<'a> {
    line:        usize,
    contract_id: &'a str,
    assessment:  &'a FraudAssessment,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("score");
    let config = match flag_value(&args, "--config") {
        Some(path) => WatchConfig::load(path)?,
        None => WatchConfig::default(),
    };

    match mode {
        "score" => run_score(&args, config),
        "watch" => run_watch(&args, config),
        other => bail!("unknown mode {other:?} (expected `score` or `watch`)"),
    }
}

fn run_score(args: &[String], config: WatchConfig) -> Result<()> {
    let rng = match flag_value(args, "--seed") {
        Some(_) => ScoreRng::seeded(parse_arg(args, "--seed", 42u64)),
        None => ScoreRng::from_entropy(),
    };
    let mut engine = ScoringEngine::new(config.scoring, rng);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let profile: ContractFinancialProfile = match serde_json::from_str(&line) {
            Ok(p) => p,
            Err(e) => {
                let err_json = serde_json::json!({ "line": index + 1, "error": e.to_string() });
                writeln!(stdout, "{err_json}")?;
                continue;
            }
        };
        let assessment = engine.evaluate(&profile);
        let scored = ScoredLine {
            line:        index + 1,
            contract_id: &profile.contract_id,
            assessment:  &assessment,
        };
        writeln!(stdout, "{}", serde_json::to_string(&scored)?)?;
    }
    stdout.flush()?;
    log::info!("scored {} profile(s)", engine.evaluation_count());
    Ok(())
}

fn run_watch(args: &[String], mut config: WatchConfig) -> Result<()> {
    if let Some(endpoint) = flag_value(args, "--endpoint") {
        config.connection.endpoint = endpoint.to_string();
    }
    config.validate()?;
    let poll_interval = config.connection.poll_interval();

    let mut bus = AlertBus::build(config)?;
    let subscription = bus.subscribe();

    // Stdin is read on its own thread so the bus loop never blocks on it.
    let (cmd_tx, cmd_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if cmd_tx.send(line.trim().to_string()).is_err() {
                break;
            }
        }
    });

    let mut stdout = io::stdout();
    bus.start(Instant::now());
    'watch: loop {
        bus.step(Instant::now());

        loop {
            match cmd_rx.try_recv() {
                Ok(cmd) => match cmd.as_str() {
                    "" => {}
                    "quit" => break 'watch,
                    "reconnect" => bus.reconnect(Instant::now()),
                    "stats" => {
                        let stats = bus.store().alert_statistics();
                        writeln!(stdout, "{}", serde_json::to_string(&stats)?)?;
                    }
                    "alerts" => {
                        let alerts = bus.store().get_alerts();
                        writeln!(stdout, "{}", serde_json::to_string(alerts)?)?;
                    }
                    other => log::warn!("Unknown command: {other}"),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'watch,
            }
        }

        while let Ok(event) = subscription.events.try_recv() {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        }
        stdout.flush()?;
        thread::sleep(poll_interval);
    }

    bus.stop();
    while let Ok(event) = subscription.events.try_recv() {
        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
    }
    stdout.flush()?;
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
