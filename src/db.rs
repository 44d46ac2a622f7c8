// ==========================================
// 关税归类引擎 - SQLite 连接初始化
// ==========================================
// 所有 Connection 统一经由 open_sqlite_connection 打开:
// - foreign_keys / busy_timeout 需每个连接单独配置
// - 文件库启用 WAL，同步写入期间仍可并发读取镜像
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    if db_path != ":memory:" {
        // 返回值为生效的模式，不需要
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    Ok(conn)
}

/// 列出当前库中的用户表（诊断用）
pub fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_applies_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pragma.db");
        let conn = open_sqlite_connection(path.to_str().unwrap()).unwrap();

        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_list_tables() {
        let conn = open_sqlite_connection(":memory:").unwrap();
        conn.execute_batch("CREATE TABLE b (x INTEGER); CREATE TABLE a (x INTEGER);")
            .unwrap();
        assert_eq!(list_tables(&conn).unwrap(), vec!["a", "b"]);
    }
}
