use job_schema_migrator::{
    config::{Command, Config},
    revisions, Chain, Migrator,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Offline commands never touch the database.
    match &config.command {
        Command::Upgrade { target, sql: true } => {
            let chain = Chain::new(revisions::all())?;
            print!("{}", chain.upgrade_script(target)?);
            return Ok(());
        }
        Command::Downgrade { target, sql: true } => {
            let chain = Chain::new(revisions::all())?;
            print!("{}", chain.downgrade_script(target)?);
            return Ok(());
        }
        Command::Show { revision } => {
            let chain = Chain::new(revisions::all())?;
            let migration = chain
                .get(revision)
                .ok_or_else(|| format!("unknown revision {}", revision))?;
            print!("{}", migration.summary());
            return Ok(());
        }
        _ => {}
    }

    let pool = config.connect().await?;
    info!("Database connection pool established");
    let migrator = Migrator::new(&pool, revisions::all())?;

    match &config.command {
        Command::Upgrade { target, .. } => {
            for revision in migrator.upgrade(target).await? {
                println!("Performed {}", revision);
            }
        }
        Command::Downgrade { target, .. } => {
            for revision in migrator.downgrade(target).await? {
                println!("Undid {}", revision);
            }
        }
        Command::Current => match migrator.current().await? {
            Some(revision) => println!("{}", revision),
            None => println!("<base>"),
        },
        Command::History => {
            for applied in migrator.history().await? {
                println!("{} {}", applied.revision, applied.executed_at.to_rfc3339());
            }
        }
        Command::Show { .. } => {}
    }

    pool.close().await;
    Ok(())
}
