mod accounts;
mod relays;

use crate::db::Database;
use tempfile::NamedTempFile;

/// Fresh database in a temp file; keep the file alive for the test's duration
async fn test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}
