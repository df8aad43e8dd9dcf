use anyhow::Result;
use glam::{DQuat, DVec3};
use hiptrack_config::{ConfigStore, PredictionConfig};
use hiptrack_device::{PhoneTracker, TrackingDevice};
use hiptrack_pose::{CaptureKind, HmdPose};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

/// Host frame period (90 Hz).
const FRAME: Duration = Duration::from_micros(11_111);

const DEFAULT_FILTER: &str =
    "hiptrack=info,hiptrack_device=info,hiptrack_net=info,hiptrack_pose=info,hiptrack_config=info";

const HELP: &str = "commands: forward | down | buzz | status | height <m> | predict on|off | quit";

/// Console commands.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Calibrate(CaptureKind),
    Buzz,
    Status,
    Height(f64),
    Predict(bool),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match (words.next()?, words.next()) {
        ("forward", None) => Command::Calibrate(CaptureKind::Forward),
        ("down", None) => Command::Calibrate(CaptureKind::Down),
        ("buzz", None) => Command::Buzz,
        ("status", None) => Command::Status,
        ("height", Some(value)) => {
            let meters: f64 = value.parse().ok()?;
            if !meters.is_finite() || meters < 0.0 {
                return None;
            }
            Command::Height(meters)
        }
        ("predict", Some("on")) => Command::Predict(true),
        ("predict", Some("off")) => Command::Predict(false),
        ("quit" | "exit", None) => Command::Quit,
        _ => return None,
    };
    words.next().is_none().then_some(command)
}

/// Apply one console command. Returns false when the runner should stop.
fn handle_command(tracker: &mut PhoneTracker<watch::Receiver<HmdPose>>, command: Command) -> bool {
    match command {
        Command::Calibrate(kind) => {
            if !tracker.status().is_ok() {
                warn!(status = %tracker.status(), "Connect the phone before calibrating");
            } else if !tracker.begin_calibration(kind) {
                warn!(?kind, "A calibration is already running");
            }
        }
        Command::Buzz => tracker.signal(0),
        Command::Status => {
            let pose = tracker.pose();
            info!(
                status = %tracker.status(),
                port = ?tracker.data_port(),
                position = ?pose.position,
                tracked = pose.tracked,
                "{}",
                tracker.status_text().replace('\n', " | ")
            );
        }
        Command::Height(meters) => tracker.set_tracker_height(meters),
        Command::Predict(enabled) => {
            let strength = tracker.config().prediction.strength;
            tracker.set_prediction(PredictionConfig { enabled, strength });
        }
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .init();

    info!("hiptrack starting");

    let store = ConfigStore::load_or_regenerate(hiptrack_config::config_path()?);
    info!(path = ?store.path(), "Settings ready");

    // Stand-in for the host's HMD: standing upright, facing forward.
    let (_hmd_tx, hmd_rx) = watch::channel(HmdPose {
        position: DVec3::new(0.0, 1.7, 0.0),
        rotation: DQuat::IDENTITY,
    });

    let mut tracker = PhoneTracker::new(store, hmd_rx);
    tracker.initialize();

    let mut status_rx = tracker.subscribe_status();
    let mut frames = tokio::time::interval(FRAME);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prompt = tracker.calibration().instructions;

    info!("{HELP}");

    loop {
        tokio::select! {
            _ = frames.tick() => {
                tracker.update();

                let current = tracker.calibration().instructions;
                if current != prompt {
                    if let Some(text) = current {
                        info!("{}", text.replace('\n', " "));
                    }
                    prompt = current;
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                info!(%status, "{}", tracker.status_text().replace('\n', " | "));
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match parse_command(&line) {
                        Some(command) => {
                            if !handle_command(&mut tracker, command) {
                                break;
                            }
                        }
                        None => warn!(input = line.trim(), "{HELP}"),
                    },
                    Ok(None) => {
                        info!("Console closed");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "Failed to read console input");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    tracker.shutdown();
    info!("hiptrack stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_commands() {
        assert_eq!(parse_command("forward"), Some(Command::Calibrate(CaptureKind::Forward)));
        assert_eq!(parse_command("  down "), Some(Command::Calibrate(CaptureKind::Down)));
        assert_eq!(parse_command("height 0.8"), Some(Command::Height(0.8)));
        assert_eq!(parse_command("predict off"), Some(Command::Predict(false)));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(parse_command("height"), None);
        assert_eq!(parse_command("height -1"), None);
        assert_eq!(parse_command("height tall"), None);
        assert_eq!(parse_command("predict maybe"), None);
        assert_eq!(parse_command("buzz twice"), None);
        assert_eq!(parse_command("dance"), None);
    }
}
