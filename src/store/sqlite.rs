use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::policy::Policy;
use crate::domain::user::UserRecord;
use crate::store::repo::UserStore;

pub struct SqliteUserStore {
    conn: Connection,
}

impl SqliteUserStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id     TEXT PRIMARY KEY,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS policies (
                user_id              TEXT NOT NULL,
                file_id              TEXT NOT NULL,
                position             INTEGER NOT NULL,
                path                 TEXT NOT NULL,
                policy_type          TEXT NOT NULL,
                print_name           TEXT NOT NULL,
                carrier              TEXT NOT NULL,
                format               TEXT NOT NULL,
                is_extracted         INTEGER NOT NULL DEFAULT 0,
                extracted_file_path  TEXT,
                metadata             TEXT,
                PRIMARY KEY (user_id, file_id)
            );
            "#,
        )?;
        Ok(())
    }

    fn load_policies(&self, user_id: &str) -> Result<Vec<Policy>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT file_id, path, policy_type, print_name, carrier, format,
                   is_extracted, extracted_file_path, metadata
            FROM policies
            WHERE user_id = ?1
            ORDER BY position
            "#,
        )?;

        let mut rows = stmt.query(params![user_id])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            let metadata: Option<String> = r.get(8)?;
            let additional_metadata = match metadata {
                Some(s) => Some(serde_json::from_str::<BTreeMap<String, String>>(&s)?),
                None => None,
            };
            out.push(Policy {
                file_id: r.get(0)?,
                path: PathBuf::from(r.get::<_, String>(1)?),
                policy_type: r.get(2)?,
                print_name: r.get(3)?,
                carrier: r.get(4)?,
                format: r.get(5)?,
                is_extracted: r.get(6)?,
                extracted_file_path: r.get::<_, Option<String>>(7)?.map(PathBuf::from),
                additional_metadata,
            });
        }
        Ok(out)
    }
}

impl UserStore for SqliteUserStore {
    fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let names = self
            .conn
            .query_row(
                r#"SELECT first_name, last_name FROM users WHERE user_id = ?1"#,
                params![user_id],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((first_name, last_name)) = names else {
            return Ok(None);
        };

        Ok(Some(UserRecord {
            user_id: user_id.to_string(),
            first_name,
            last_name,
            policies: self.load_policies(user_id)?,
        }))
    }

    fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO users (user_id, first_name, last_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
              first_name=excluded.first_name,
              last_name=excluded.last_name
            "#,
            params![user.user_id, user.first_name, user.last_name],
        )?;

        tx.execute(
            r#"DELETE FROM policies WHERE user_id = ?1"#,
            params![user.user_id],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO policies (user_id, file_id, position, path, policy_type, print_name,
                                      carrier, format, is_extracted, extracted_file_path, metadata)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;
            for (position, p) in user.policies.iter().enumerate() {
                let metadata = p
                    .additional_metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    user.user_id,
                    p.file_id,
                    position as i64,
                    p.path.to_string_lossy().into_owned(),
                    p.policy_type,
                    p.print_name,
                    p.carrier,
                    p.format,
                    p.is_extracted,
                    p.extracted_file_path
                        .as_ref()
                        .map(|x| x.to_string_lossy().into_owned()),
                    metadata,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn record_extraction(&self, user_id: &str, file_id: &str, text_path: &Path) -> Result<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE policies
            SET is_extracted = 1, extracted_file_path = ?3
            WHERE user_id = ?1 AND file_id = ?2
            "#,
            params![user_id, file_id, text_path.to_string_lossy().into_owned()],
        )?;
        if changed == 0 {
            return Err(anyhow!("no policy {file_id} for user {user_id}"));
        }
        Ok(())
    }

    fn user_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT user_id FROM users ORDER BY user_id"#)?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(file_id: &str, name: &str) -> Policy {
        Policy {
            file_id: file_id.into(),
            path: PathBuf::from(format!("policies/{file_id}.pdf")),
            policy_type: "auto".into(),
            print_name: name.into(),
            carrier: "Acme Mutual".into(),
            format: "pdf".into(),
            is_extracted: false,
            extracted_file_path: None,
            additional_metadata: None,
        }
    }

    fn user(policies: Vec<Policy>) -> UserRecord {
        UserRecord {
            user_id: "user1".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            policies,
        }
    }

    #[test]
    fn unknown_user_is_none() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        assert!(store.find_user("nobody").unwrap().is_none());
    }

    #[test]
    fn upsert_then_find_keeps_policy_order() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let mut home = policy("p2", "Home Policy");
        home.additional_metadata = Some(BTreeMap::from([("year".into(), "2024".into())]));
        store
            .upsert_user(&user(vec![policy("p9", "Auto Policy"), home.clone()]))
            .unwrap();

        let found = store.find_user("user1").unwrap().unwrap();
        assert_eq!(found.first_name, "Ada");
        let names: Vec<_> = found.policies.iter().map(|p| p.print_name.as_str()).collect();
        assert_eq!(names, vec!["Auto Policy", "Home Policy"]);
        assert_eq!(found.policies[1], home);
    }

    #[test]
    fn upsert_replaces_the_policy_list() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        store
            .upsert_user(&user(vec![policy("p1", "A"), policy("p2", "B")]))
            .unwrap();
        store.upsert_user(&user(vec![policy("p3", "C")])).unwrap();

        let found = store.find_user("user1").unwrap().unwrap();
        assert_eq!(found.policies.len(), 1);
        assert_eq!(found.policies[0].file_id, "p3");
        assert_eq!(store.user_ids().unwrap(), vec!["user1".to_string()]);
    }

    #[test]
    fn record_extraction_sets_flag_and_path() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        store.upsert_user(&user(vec![policy("p1", "A")])).unwrap();
        store
            .record_extraction("user1", "p1", Path::new("policies/p1.txt"))
            .unwrap();

        let p = &store.find_user("user1").unwrap().unwrap().policies[0];
        assert!(p.is_extracted);
        assert_eq!(p.extracted_file_path.as_deref(), Some(Path::new("policies/p1.txt")));

        assert!(store.record_extraction("user1", "missing", Path::new("x.txt")).is_err());
    }
}
