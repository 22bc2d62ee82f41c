use pomoledger_core::Config;

use super::open_database;

pub fn run(limit: usize, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = open_database(&config)?;
    let sessions = db.recent_sessions(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions recorded.");
        return Ok(());
    }
    for session in &sessions {
        println!("{session}");
    }
    Ok(())
}
