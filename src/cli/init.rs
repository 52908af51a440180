use std::path::PathBuf;

use pocketledger::settings::{load_settings, save_settings, shellexpand_path};
use pocketledger::Store;

pub fn run(data_dir: Option<String>) -> anyhow::Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }

    let data_path = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&data_path)?;
    let store = Store::open(&settings.db_path(), settings.store_options())?;
    save_settings(&settings)?;

    println!("Data dir:   {}", data_path.display());
    println!("Database:   {}", store.path().display());
    println!("Ready. Add an account with `pocketledger accounts add`.");
    Ok(())
}
