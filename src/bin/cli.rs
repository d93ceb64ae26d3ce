//! obschain CLI
//!
//! Command-line interface for inspecting and appending to an on-disk
//! observation store.

use std::process;

use clap::{Parser, Subcommand};
use obschain::{
    Config, Encoding, Index, Location, RecordPayload, RecordStore, StationInfo, StationKey,
    TimeRange,
};
use tracing_subscriber::{fmt, EnvFilter};

/// obschain CLI
#[derive(Parser, Debug)]
#[command(name = "obschain-cli")]
#[command(about = "Station-linkage index for observation record stores")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./obschain_data")]
    data_dir: String,

    /// Chain encoding for a newly created store (forward, backward, contiguous)
    #[arg(short, long, default_value = "forward")]
    encoding: Encoding,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show encoding, record count and extent
    Info,

    /// List stations with their chain and observation counts
    Stations,

    /// Print a station's observations in time order
    Obs {
        /// Station key (integers are treated as numeric ids)
        station: String,

        /// Inclusive start time (unix millis)
        #[arg(long)]
        start: Option<i64>,

        /// Inclusive end time (unix millis)
        #[arg(long)]
        end: Option<i64>,
    },

    /// Append observations and finalize them as one batch
    ///
    /// Each invocation is its own write session, so it adds one chain to
    /// the station. Pass every time of a batch in one call to keep them
    /// on a single chain.
    Append {
        /// Station key
        station: String,

        /// Observation times (unix millis), one record each
        #[arg(required = true, num_args = 1..)]
        times: Vec<i64>,

        /// Nominal time (unix millis)
        #[arg(long)]
        nominal: Option<i64>,

        /// Payload field as name=value (repeatable)
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, f64)>,

        /// Station latitude
        #[arg(long, requires = "lon")]
        lat: Option<f64>,

        /// Station longitude
        #[arg(long, requires = "lat")]
        lon: Option<f64>,

        /// Station description
        #[arg(long)]
        description: Option<String>,
    },

    /// Walk every chain and report corruption
    Verify,
}

fn parse_field(input: &str) -> Result<(String, f64), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {}", input))?;
    let value = value
        .parse::<f64>()
        .map_err(|e| format!("bad value for {}: {}", name, e))?;
    Ok((name.to_string(), value))
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,obschain=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("obschain v{}", obschain::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .encoding(args.encoding)
        .build();

    match run(&config, args.command) {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(1);
        }
    }
}

/// Execute one command; `Ok(false)` means the command found problems
fn run(config: &Config, command: Commands) -> obschain::Result<bool> {
    let index = Index::open_config(config)?;

    match command {
        Commands::Info => {
            println!("encoding:  {}", index.encoding());
            println!("records:   {}", index.store().record_count());
            println!("stations:  {}", index.stations().len());
            match index.bounding_box() {
                Some(b) => println!(
                    "extent:    lat [{}, {}] lon [{}, {}]",
                    b.lat_min, b.lat_max, b.lon_min, b.lon_max
                ),
                None => println!("extent:    -"),
            }
            if !index.merge_faults().is_empty() {
                println!("faults:    {}", index.merge_faults().len());
            }
        }

        Commands::Stations => {
            for station in index.stations() {
                let count = station
                    .count()
                    .map_or_else(|| "?".to_string(), |c| c.to_string());
                let location = station.location.map_or_else(
                    || "-".to_string(),
                    |l| format!("{:.4},{:.4}", l.latitude, l.longitude),
                );
                println!(
                    "{}\t{}\tchains={}\tcount={}\t{}",
                    station.key,
                    location,
                    station.chains().len(),
                    count,
                    station.description
                );
            }
        }

        Commands::Obs {
            station,
            start,
            end,
        } => {
            let range = match (start, end) {
                (None, None) => None,
                (s, e) => Some(TimeRange::new(s.unwrap_or(i64::MIN), e.unwrap_or(i64::MAX))),
            };
            let key = StationKey::parse(&station);
            for obs in index.observations_of(&key, range)? {
                let fields: Vec<String> = obs
                    .payload
                    .fields
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect();
                println!("{}\t{}\t{}", obs.recno, obs.time(), fields.join(" "));
            }
        }

        Commands::Append {
            station,
            times,
            nominal,
            fields,
            lat,
            lon,
            description,
        } => {
            let key = StationKey::parse(&station);
            let mut info = StationInfo::new(key.clone());
            if let (Some(lat), Some(lon)) = (lat, lon) {
                info = info.location(Location::new(lat, lon));
            }
            if let Some(description) = description {
                info = info.description(description);
            }

            let mut writer = index.writer();
            writer.register_station(info)?;
            for time in times {
                let mut payload = RecordPayload::new(key.clone(), time);
                if let Some(nominal) = nominal {
                    payload = payload.nominal_time(nominal);
                }
                for (name, value) in &fields {
                    payload = payload.field(name.clone(), *value);
                }
                println!("{}", writer.append(payload)?);
            }
            writer.finalize()?;
        }

        Commands::Verify => {
            let report = index.verify();
            println!(
                "stations={} observations={} merge_faults={} corruptions={}",
                report.stations,
                report.observations,
                report.merge_faults,
                report.corruptions.len()
            );
            for fault in index.merge_faults() {
                println!("merge: {}", fault);
            }
            for fault in &report.corruptions {
                println!("chain: {}", fault);
            }
            return Ok(report.is_clean());
        }
    }

    Ok(true)
}
