use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use route_planner::config::PlannerConfig;
use route_planner::coordinate::Coordinate;
use route_planner::planner::{Comparison, Planner, PlanningResult};
use route_planner::solver::SolverChoice;
use route_planner::stops::generate_stops;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file; missing keys keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a delivery tour starting and ending at the depot
    Plan {
        /// Stops as "lat,lon;lat,lon;..."
        #[arg(short, long, value_parser = parse_coordinates)]
        stops: Option<StopList>,

        /// Add this many random stops around the depot
        #[arg(short, long)]
        random: Option<usize>,

        /// Depot as "lat,lon"; defaults to the configured depot
        #[arg(long, value_parser = parse_coordinate)]
        depot: Option<Coordinate>,

        #[arg(short, long, value_enum, default_value_t = SolverChoice::Auto)]
        algorithm: SolverChoice,

        /// Run the exact and approximate solvers and compare them
        #[arg(long)]
        compare: bool,
    },
    /// Delete expired cache entries
    SweepCache,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let config = PlannerConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let planner = Planner::from_config(&config).context("building HTTP clients")?;

    match cli.command {
        Commands::Plan {
            stops,
            random,
            depot,
            algorithm,
            compare,
        } => {
            let depot = depot.unwrap_or(config.depot);
            let mut coords = vec![depot];
            if let Some(StopList(stops)) = stops {
                coords.extend(stops);
            }

            let random = match random {
                Some(count) => count,
                None if coords.len() == 1 => config.default_stops,
                None => 0,
            };
            if random > 0 {
                let generated = generate_stops(depot, random, &config.stop_options(), &mut rand::rng());
                info!(requested = random, generated = generated.len(), "generated random stops");
                coords.extend(generated);
            }
            if coords.len() < 2 {
                bail!("no stops to visit");
            }

            let planner = Arc::new(planner);
            let print_progress = |progress: route_planner::planner::Progress| {
                println!("[{:>3}%] {}", progress.percent, progress.message);
            };

            if compare {
                let comparison = planner.spawn_comparison(coords).wait(print_progress)?;
                print_comparison(&comparison);
            } else {
                let result = planner.spawn(coords, algorithm).wait(print_progress)?;
                print_result(&result);
            }
        }
        Commands::SweepCache => {
            let removed = planner.cache().sweep();
            println!("removed {} expired entries from {}", removed, planner.cache().dir().display());
        }
    }

    Ok(())
}

fn print_result(result: &PlanningResult) {
    println!("algorithm: {}", result.algorithm_label());
    println!("distance:  {:.2} km", result.total_distance() / 1000.0);
    println!("order:     {:?}", result.tour.order);
    println!("route:     {} points", result.route.len());
    println!("elapsed:   {:.2?}", result.elapsed);
}

fn print_comparison(comparison: &Comparison) {
    print_result(&comparison.exact);
    println!();
    print_result(&comparison.approximate);
    println!();
    println!(
        "gap:       {:.1} m ({:.2}%)",
        comparison.distance_gap_m(),
        comparison.distance_gap_percent()
    );
    match comparison.speed_ratio() {
        Some(ratio) => println!("speed:     approximate solver {ratio:.1}x faster"),
        None => println!("speed:     approximate solver too fast to measure"),
    }
}

fn parse_coordinate(text: &str) -> Result<Coordinate, String> {
    let (lat, lon) = text
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lon\", got \"{text}\""))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("bad latitude \"{lat}\""))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("bad longitude \"{lon}\""))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinate out of range: {text}"));
    }
    Ok(Coordinate::new(lat, lon))
}

/// Semicolon-separated coordinates, parsed as one argument.
#[derive(Debug, Clone)]
struct StopList(Vec<Coordinate>);

fn parse_coordinates(text: &str) -> Result<StopList, String> {
    text.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_coordinate)
        .collect::<Result<_, _>>()
        .map(StopList)
}
