use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info};

use hust_run_rust_lib::app::config::{
    backup_path_for, config_path, load_config_from_path, save_config_to_path, AppConfig,
    PlaybackPace,
};
use hust_run_rust_lib::app::credentials::store_credentials;
use hust_run_rust_lib::app::error::AppError;
use hust_run_rust_lib::app::geo::GeoPoint;
use hust_run_rust_lib::app::logging::init_logging;
use hust_run_rust_lib::app::models::ActivityType;
use hust_run_rust_lib::app::route::RouteSpec;
use hust_run_rust_lib::app::session::{ExerciseSession, SimulationOutcome};

#[derive(Debug, Parser)]
#[command(name = "hust-run", author, version, about)]
struct Cli {
    /// Config file, defaults to `$HUST_RUN_CONFIG_PATH` or `~/.hust_run_config.json`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Device serial, overrides `device.device_id`.
    #[arg(long, global = true)]
    serial: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pace {
    /// Spread the points evenly over the run duration.
    Timed,
    /// Walk point to point at the configured average speed.
    Speed,
}

impl From<Pace> for PlaybackPace {
    fn from(pace: Pace) -> Self {
        match pace {
            Pace::Timed => PlaybackPace::Timed,
            Pace::Speed => PlaybackPace::Speed,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to the device and verify it answers.
    Connect,
    /// Drop a network (host:port) adb connection.
    Disconnect,
    /// Connect, launch, log in, run the configured route and record it.
    Auto,
    /// Log in to the app, optionally storing new credentials first.
    Login {
        #[arg(long, requires = "password")]
        username: Option<String>,
        #[arg(long, requires = "username")]
        password: Option<String>,
    },
    /// Start an exercise, play the route and end the exercise.
    Run {
        #[arg(short, long)]
        route: Option<String>,
        #[arg(long, value_enum)]
        pace: Option<Pace>,
    },
    /// Only play mock locations along a route.
    Simulate {
        #[arg(short, long)]
        route: Option<String>,
        /// Minutes, overrides `run.duration_minutes`.
        #[arg(short, long)]
        duration: Option<u64>,
        #[arg(long, value_enum)]
        pace: Option<Pace>,
    },
    #[command(subcommand)]
    App(AppCommand),
    #[command(subcommand)]
    Input(InputCommand),
    #[command(subcommand)]
    Route(RouteCommand),
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Debug, Subcommand)]
enum AppCommand {
    Install {
        apk: PathBuf,
    },
    /// Defaults to `app.package_name`.
    Uninstall {
        package: Option<String>,
    },
    /// Force-stop, defaults to `app.package_name`.
    Stop {
        package: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum InputCommand {
    Tap {
        x: i32,
        y: i32,
    },
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        #[arg(long, default_value_t = 300)]
        duration_ms: u64,
    },
    Text {
        text: String,
    },
    Key {
        keycode: u32,
    },
}

#[derive(Debug, Subcommand)]
enum RouteCommand {
    Create {
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Meters.
        #[arg(long)]
        distance: f64,
        #[arg(long)]
        out_and_back: bool,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long = "type", default_value = "running")]
        route_type: String,
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    List,
    Show {
        name: String,
    },
    Delete {
        name: String,
    },
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// 0 running, 1 cycling, 2 walking.
        #[arg(long)]
        activity: Option<u8>,
    },
    Stats {
        #[arg(long)]
        activity: Option<u8>,
    },
    Show {
        id: i64,
    },
    Delete {
        id: i64,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::system(format!("Failed to serialize output: {err}"), ""))?;
    println!("{payload}");
    Ok(())
}

fn parse_activity(code: Option<u8>) -> Result<Option<ActivityType>, AppError> {
    code.map(|code| {
        ActivityType::from_code(code)
            .ok_or_else(|| AppError::validation(format!("Unknown activity type: {code}"), ""))
    })
    .transpose()
}

fn report_outcome(session: &ExerciseSession, outcome: &SimulationOutcome, save: bool) -> Result<(), AppError> {
    print_json(outcome)?;
    if save {
        let id = session.save_history(outcome)?;
        info!(trace_id = %session.trace_id(), record_id = id, "saved exercise history");
    }
    Ok(())
}

fn connected(session: &mut ExerciseSession) -> bool {
    if session.connect() {
        println!(
            "connected: {}",
            session.device().serial().unwrap_or("<unknown>")
        );
        true
    } else {
        eprintln!("no usable device; check `adb devices`");
        false
    }
}

fn execute(cli: Cli, mut config: AppConfig, path: PathBuf) -> Result<bool, AppError> {
    match cli.command {
        Command::Connect => {
            let mut session = ExerciseSession::new(config);
            Ok(connected(&mut session))
        }
        Command::Disconnect => {
            let mut session = ExerciseSession::new(config);
            Ok(connected(&mut session) && session.disconnect())
        }
        Command::Auto => Ok(ExerciseSession::new(config).auto_run()),
        Command::Login { username, password } => {
            if let (Some(username), Some(password)) = (username, password) {
                store_credentials(&mut config.user, &username, &password);
                save_config_to_path(&config, &path, &backup_path_for(&path))?;
            }
            let mut session = ExerciseSession::new(config);
            Ok(connected(&mut session) && session.login())
        }
        Command::Run { route, pace } => {
            if let Some(pace) = pace {
                config.run.pace = pace.into();
            }
            let mut session = ExerciseSession::new(config);
            if !connected(&mut session) {
                return Ok(false);
            }
            let outcome = session.run_exercise(route.as_deref())?;
            let save = session.config().storage.save_history;
            report_outcome(&session, &outcome, save)?;
            Ok(outcome.report.issued > 0)
        }
        Command::Simulate {
            route,
            duration,
            pace,
        } => {
            if let Some(minutes) = duration.filter(|minutes| *minutes > 0) {
                config.run.duration_minutes = minutes;
            }
            if let Some(pace) = pace {
                config.run.pace = pace.into();
            }
            let mut session = ExerciseSession::new(config);
            if !connected(&mut session) {
                return Ok(false);
            }
            let outcome = session.simulate(route.as_deref())?;
            report_outcome(&session, &outcome, false)?;
            Ok(outcome.report.issued > 0)
        }
        Command::App(command) => {
            let default_package = config.app.package_name.clone();
            let mut session = ExerciseSession::new(config);
            if !connected(&mut session) {
                return Ok(false);
            }
            let device = session.device();
            Ok(match command {
                AppCommand::Install { apk } => device.install_app(&apk.to_string_lossy()),
                AppCommand::Uninstall { package } => {
                    device.uninstall_app(package.as_deref().unwrap_or(&default_package))
                }
                AppCommand::Stop { package } => {
                    device.stop_app(package.as_deref().unwrap_or(&default_package))
                }
            })
        }
        Command::Input(command) => {
            let mut session = ExerciseSession::new(config);
            if !connected(&mut session) {
                return Ok(false);
            }
            let device = session.device();
            Ok(match command {
                InputCommand::Tap { x, y } => device.tap(x, y),
                InputCommand::Swipe {
                    x1,
                    y1,
                    x2,
                    y2,
                    duration_ms,
                } => device.swipe((x1, y1), (x2, y2), duration_ms),
                InputCommand::Text { text } => device.input_text(&text),
                InputCommand::Key { keycode } => device.key_event(keycode),
            })
        }
        Command::Route(command) => {
            let session = ExerciseSession::new(config);
            let store = session.route_store();
            match command {
                RouteCommand::Create {
                    name,
                    lat,
                    lon,
                    distance,
                    out_and_back,
                    description,
                    route_type,
                    repeat,
                } => {
                    let mut route = session.route_generator().build_route(&RouteSpec {
                        name: name.clone(),
                        description,
                        route_type,
                        start: GeoPoint::new(lat, lon),
                        distance_m: distance,
                        is_loop: !out_and_back,
                    })?;
                    route.repeat = repeat;
                    let saved = store.save(&name, &route)?;
                    println!("saved {}", saved.display());
                }
                RouteCommand::List => {
                    for name in store.list()? {
                        println!("{name}");
                    }
                }
                RouteCommand::Show { name } => print_json(&store.load(&name)?)?,
                RouteCommand::Delete { name } => {
                    if !store.delete(&name)? {
                        eprintln!("route not found: {name}");
                        return Ok(false);
                    }
                    println!("deleted {name}");
                }
            }
            Ok(true)
        }
        Command::History(command) => {
            let session = ExerciseSession::new(config);
            let history = session.open_history()?;
            match command {
                HistoryCommand::List {
                    limit,
                    offset,
                    activity,
                } => print_json(&history.get_records(limit, offset, parse_activity(activity)?)?)?,
                HistoryCommand::Stats { activity } => {
                    print_json(&history.statistics(parse_activity(activity)?)?)?
                }
                HistoryCommand::Show { id } => match history.get_record(id)? {
                    Some(record) => {
                        print_json(&record)?;
                        print_json(&history.get_location_points(id)?)?;
                    }
                    None => {
                        eprintln!("record not found: {id}");
                        return Ok(false);
                    }
                },
                HistoryCommand::Delete { id } => {
                    if !history.delete_record(id)? {
                        eprintln!("record not found: {id}");
                        return Ok(false);
                    }
                    println!("deleted {id}");
                }
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(config_path);
    let mut config = match load_config_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(serial) = cli.serial.as_deref() {
        config.device.device_id = serial.to_string();
    }
    init_logging(&config.logging, cli.verbose);

    match execute(cli, config, path) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, code = err.code(), "command failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
