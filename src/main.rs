// ==========================================
// 关税归类引擎 - 命令行入口
// ==========================================
// 用法:
//   tariff-engine validate <code>
//   tariff-engine lookup <code> [origin]
//   tariff-engine lookup-v2 <code> [origin] [--persist]
//   tariff-engine batch <code,code,...> [origin]
//   tariff-engine hierarchy <prefix> [origin]
//   tariff-engine search <query> [chapter] [origin]
//   tariff-engine sync <nomenclature_file> <duties_file> [taric_version]
//   tariff-engine status [sync_id]
//   tariff-engine history [limit]
// 数据库路径: TARIFF_ENGINE_DB_PATH 或用户数据目录
// ==========================================

use serde::Serialize;
use std::path::PathBuf;
use tariff_engine::app::{get_default_db_path, AppState};
use tariff_engine::domain::sync::{SyncInput, SyncOptions};

const USAGE: &str = "用法: tariff-engine <validate|lookup|lookup-v2|batch|hierarchy|search|sync|status|history> [参数...]";

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn required(arg: Option<&String>, name: &str) -> Result<String, Box<dyn std::error::Error>> {
    arg.cloned()
        .ok_or_else(|| format!("缺少参数 <{}>\n{}", name, USAGE).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tariff_engine::logging::init_from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{} v{}", tariff_engine::APP_NAME, tariff_engine::VERSION);
        println!("{}", USAGE);
        return Ok(());
    };
    let arg = |i: usize| args.get(i);
    let opt = |i: usize| args.get(i).map(String::as_str).filter(|s| !s.starts_with("--"));

    let db_path = get_default_db_path();
    tracing::info!(db_path = %db_path, command = %command, "使用数据库");
    let state = AppState::new(db_path).await?;
    let api = &state.tariff_api;

    match command.as_str() {
        "validate" => {
            let code = required(arg(1), "code")?;
            print_json(&api.validate_code(&code).await?)?;
        }
        "lookup" => {
            let code = required(arg(1), "code")?;
            print_json(&api.lookup_rate(&code, opt(2)).await?)?;
        }
        "lookup-v2" => {
            let code = required(arg(1), "code")?;
            let persist = args.iter().any(|a| a == "--persist");
            print_json(&api.lookup_v2(&code, opt(2), persist).await?)?;
        }
        "batch" => {
            let codes: Vec<String> = required(arg(1), "codes")?
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            print_json(&api.batch_lookup(&codes, opt(2), None).await?)?;
        }
        "hierarchy" => {
            let prefix = required(arg(1), "prefix")?;
            print_json(&api.get_hierarchy(&prefix, opt(2)).await?)?;
        }
        "search" => {
            let query = required(arg(1), "query")?;
            print_json(&api.search_by_description(&query, opt(2), opt(3), None, None).await?)?;
        }
        "sync" => {
            let nomenclature = required(arg(1), "nomenclature_file")?;
            let duties = required(arg(2), "duties_file")?;
            let options = SyncOptions {
                nomenclature: SyncInput::Path(PathBuf::from(nomenclature)),
                duties: SyncInput::Path(PathBuf::from(duties)),
                data_source: "file".to_string(),
                taric_version: opt(3).map(str::to_string),
                translate: state.config.translate_enabled,
            };
            print_json(&state.sync_api.run_sync(options).await?)?;
        }
        "status" => {
            print_json(&state.sync_api.get_sync_status(opt(1))?)?;
        }
        "history" => {
            let limit = opt(1).and_then(|l| l.parse().ok());
            print_json(&state.sync_api.list_sync_history(limit, None)?)?;
        }
        other => {
            return Err(format!("未知命令: {}\n{}", other, USAGE).into());
        }
    }

    Ok(())
}
