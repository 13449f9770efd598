//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open (or create) a roster database and exercise the member repository end to end.
//! - Keep output deterministic JSON for quick local sanity checks.
//!
//! Usage: `roster_cli [db_path] [query]`, e.g. `roster_cli roster.db "page=0&size=3&sort=id,desc"`.

use log::info;
use roster_core::db::open_with_config;
use roster_core::{
    core_version, init_logging_from_config, CrudRepository, MemberController, MemberRepository,
    StoreConfig, UnitOfWork,
};
use std::error::Error;
use std::path::PathBuf;

const SEED_MEMBERS: u32 = 100;
const DEFAULT_QUERY: &str = "page=0&size=5&sort=id,desc";

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let mut config = StoreConfig::from_env()?;
    if let Some(path) = args.next() {
        config.db_path = Some(PathBuf::from(path));
    }
    let query = args.next().unwrap_or_else(|| DEFAULT_QUERY.to_string());

    init_logging_from_config(&config)?;
    info!(
        "event=cli_start module=cli status=ok version={}",
        core_version()
    );

    let mut conn = open_with_config(&config)?;
    let uow = UnitOfWork::begin(&mut conn)?;
    let controller = MemberController::new(MemberRepository::try_new(&uow)?);

    if controller.repository().count()? == 0 {
        controller.init(SEED_MEMBERS)?;
    }
    let page = controller.list(&query)?;
    println!("{}", serde_json::to_string_pretty(&page)?);

    drop(controller);
    uow.commit()?;
    Ok(())
}
