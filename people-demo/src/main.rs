use anyhow::{bail, Context};
use sqlrecord::ConnectionConfig;
use tracing_subscriber::EnvFilter;

mod people;

use people::{Person, TABLE};

const USAGE: &str = "usage: people-demo <config.json> [--populate]";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config_path = None;
    let mut populate = false;
    for argument in std::env::args().skip(1) {
        match argument.as_str() {
            "--populate" => populate = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ if config_path.is_none() => config_path = Some(argument),
            _ => bail!("unexpected argument `{}`\n{}", argument, USAGE),
        }
    }
    let Some(config_path) = config_path else {
        bail!(USAGE);
    };

    let config = ConnectionConfig::from_json_file(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;

    let mut connection = sqlrecord::connect(config).context("connecting to the database")?;
    people::setup(&mut connection, populate).context("preparing the people table")?;

    let everyone: Vec<Person> = connection.select_all(TABLE)?;
    tracing::info!(count = everyone.len(), "people");
    for person in &everyone {
        tracing::info!(id = person.id, name = %person.name, age = person.age, email = %person.email);
    }

    let boomers: Vec<Person> = connection.select_where(TABLE, "age >= 75")?;
    tracing::info!(count = boomers.len(), "boomers");
    for person in &boomers {
        tracing::info!(id = person.id, name = %person.name, age = person.age);
    }

    connection.close();
    Ok(())
}
