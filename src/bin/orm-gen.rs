//! Generates one Rust module per table from the live schema.
//!
//! Connection settings come from `.env`, the environment or `orm.conf`; any
//! still missing are prompted for. Database and table are prompted for when
//! not given; `*` selects all of them.

use clap::Parser;
use orm_rest::catalog::Catalog;
use orm_rest::codegen::{generate, WILDCARD};
use orm_rest::settings::PartialSettings;
use orm_rest::MySqlStore;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// Database name, or `*` for all.
    #[clap(short, long)]
    database: Option<String>,
    /// Table name, or `*` for all.
    #[clap(short, long)]
    table: Option<String>,
    /// Output directory; modules land in `{out}/{database}/{table}.rs`.
    #[clap(short, long, default_value = "generated")]
    out: PathBuf,
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("orm_rest=info".parse()?))
        .init();
    let cli = Cli::parse();

    let mut partial = PartialSettings::discover()?;
    for key in partial.missing() {
        let value = prompt(key)?;
        partial.set(key, value);
    }
    let store = MySqlStore::connect_lazy(&partial.complete()?)?;

    let database = match cli.database {
        Some(d) => d,
        None => {
            for name in store.list_databases().await? {
                println!("  {}", name);
            }
            prompt("database (* for all)")?
        }
    };
    let table = match cli.table {
        Some(t) => t,
        None if database == WILDCARD => WILDCARD.to_string(),
        None => {
            for name in store.list_tables(&database).await? {
                println!("  {}", name);
            }
            prompt("table (* for all)")?
        }
    };

    let written = generate(&store, &database, &table, &cli.out).await?;
    for path in &written {
        println!("{}", path.display());
    }
    println!("{} module(s) written", written.len());
    Ok(())
}
