//! densekv CLI
//!
//! Command-line interface over a persistent densekv data directory.

use std::path::Path;

use clap::{Parser, Subcommand, ValueEnum};
use densekv::{Database, IndexKind, KeyMap, Map, MapOptions, SetKind};
use tracing_subscriber::{fmt, EnvFilter};

/// densekv CLI
#[derive(Parser, Debug)]
#[command(name = "densekv-cli")]
#[command(about = "CLI for the densekv embedded key-value engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./densekv_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Define a map
    Define {
        /// Map name
        name: String,

        /// Storage strategy
        #[arg(short, long, value_enum, default_value = "fixed")]
        kind: KindArg,

        /// Values per key (fixed maps)
        #[arg(short, long, default_value = "1")]
        values: usize,

        /// Secondary index kind (fixed and list maps), e.g. many-to-one
        #[arg(short, long)]
        index: Option<String>,
    },

    /// Store a value (fixed and list maps) or a member (set maps)
    Put {
        map: String,
        key: i64,
        value: i64,

        /// Position inside the node or list
        #[arg(short, long, default_value = "0")]
        position: u64,
    },

    /// Read the values stored under a key
    Get { map: String, key: i64 },

    /// Append a value to a list
    Push { map: String, key: i64, value: i64 },

    /// List the values of a key
    Values { map: String, key: i64 },

    /// List active keys in a range
    Keys {
        map: String,
        #[arg(default_value_t = 0)]
        lo: i64,
        #[arg(default_value_t = i64::MAX)]
        hi: i64,
    },

    /// Keys holding a value in a range
    Query {
        map: String,
        lo: i64,
        hi: i64,

        /// Sort the result by key
        #[arg(short, long)]
        sorted: bool,
    },

    /// Show map statistics
    Stats {
        /// Map name (all maps when omitted)
        map: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Fixed,
    List,
    Set,
    Multiset,
    Attributed,
}

impl KindArg {
    fn options(self, values: usize) -> MapOptions {
        match self {
            KindArg::Fixed => MapOptions::fixed(values),
            KindArg::List => MapOptions::list(),
            KindArg::Set => MapOptions::set(SetKind::Plain),
            KindArg::Multiset => MapOptions::set(SetKind::Multi),
            KindArg::Attributed => MapOptions::set(SetKind::Attributed),
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,densekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut db = match Database::open_dir(Path::new(&args.data_dir)) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&mut db, args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = db.close() {
        tracing::error!("Failed to close database: {}", e);
        std::process::exit(1);
    }
}

fn run(db: &mut Database, command: Commands) -> densekv::Result<()> {
    match command {
        Commands::Define {
            name,
            kind,
            values,
            index,
        } => {
            let mut options = kind.options(values);
            if let Some(index) = index {
                options = options.with_index(IndexKind::from_name(&index)?);
            }
            let map = db.define_map(&name, options)?;
            println!("{} ({})", map.name(), map.kind());
        }

        Commands::Put {
            map,
            key,
            value,
            position,
        } => match db.map(&map)? {
            Map::Fixed(m) => {
                let index = usize::try_from(position).unwrap_or(usize::MAX);
                m.put(key, index, value)?;
            }
            Map::List(m) => {
                m.put(key, position, value)?;
            }
            Map::Set(m) => m.add(key, value)?,
        },

        Commands::Get { map, key } => match db.map(&map)? {
            Map::Fixed(m) => print_values(m.values(key).unwrap_or_default()),
            Map::List(m) => print_values(m.raw_values(key)),
            Map::Set(m) => {
                for (value, attribute) in m.entries(key)? {
                    println!("{}\t{}", value, attribute);
                }
            }
        },

        Commands::Push { map, key, value } => {
            let len = db.list_map(&map)?.push(key, value)?;
            println!("{}", len);
        }

        Commands::Values { map, key } => match db.map(&map)? {
            Map::Fixed(m) => print_values(m.values(key).unwrap_or_default()),
            Map::List(m) => print_values(m.values(key).collect()),
            Map::Set(m) => print_values(m.values(key)?.collect()),
        },

        Commands::Keys { map, lo, hi } => {
            for key in db.map(&map)?.keys(lo, hi)? {
                println!("{}", key);
            }
        }

        Commands::Query {
            map,
            lo,
            hi,
            sorted,
        } => {
            let keys = db.map(&map)?.query(lo, hi)?;
            let keys: Vec<i64> = if sorted { keys.sorted() } else { keys.collect() };
            for key in keys {
                println!("{}", key);
            }
        }

        Commands::Stats { map } => {
            let names = match map {
                Some(name) => vec![name],
                None => db.map_names()?,
            };
            for name in names {
                let map = db.map(&name)?;
                let stats = map.stats();
                println!(
                    "{}: kind={} keys={} windows={} buffers={} words={} free_slots={} pending={}",
                    name,
                    map.kind(),
                    stats.keys,
                    stats.windows,
                    stats.value_buffers,
                    stats.value_words,
                    stats.free_slots,
                    stats.pending_set_keys
                );
            }
        }
    }
    Ok(())
}

fn print_values(values: Vec<i64>) {
    let text: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    println!("{}", text.join(" "));
}
