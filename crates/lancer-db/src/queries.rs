use crate::models::{ChatRow, FileRow, MessageRow, NewFile, ParticipantRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

/// Columns + joins shared by every message select. `sender_username` comes
/// from a LEFT JOIN so a message survives its author row going missing.
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.chat_id, m.sender_id, u.username, m.content,
           m.file_id, f.filename, f.content_type, f.size,
           m.is_read, m.created_at, m.updated_at
    FROM messages m
    LEFT JOIN users u ON m.sender_id = u.id
    LEFT JOIN files f ON m.file_id = f.id";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, username, password, online, last_seen, created_at FROM users WHERE username = ?1", username)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, username, password, online, last_seen, created_at FROM users WHERE id = ?1", id)
        })
    }

    /// Flip the persisted presence flag. `last_seen` is only written on the
    /// offline transition, so pass None when going online.
    pub fn set_presence(&self, id: &str, online: bool, last_seen: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET online = ?2, last_seen = COALESCE(?3, last_seen) WHERE id = ?1",
                rusqlite::params![id, online, last_seen],
            )?;
            Ok(())
        })
    }

    // -- Chats --

    pub fn create_chat(
        &self,
        id: &str,
        name: Option<&str>,
        is_group: bool,
        participant_ids: &[String],
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO chats (id, name, is_group) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, is_group],
            )?;
            for user_id in participant_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                    rusqlite::params![id, user_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Resolve the two-party chat between these users, creating it when it
    /// doesn't exist yet. Find and create run under the same connection
    /// guard, so two racing requests for the same pair resolve to one chat.
    /// Returns the chat id and whether this call created it.
    pub fn find_or_create_private_chat(
        &self,
        candidate_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<(String, bool)> {
        self.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT c.id FROM chats c
                     JOIN chat_participants p1 ON p1.chat_id = c.id AND p1.user_id = ?1
                     JOIN chat_participants p2 ON p2.chat_id = c.id AND p2.user_id = ?2
                     WHERE c.is_group = 0
                     LIMIT 1",
                    rusqlite::params![user_a, user_b],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok((id, false));
            }

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO chats (id, name, is_group) VALUES (?1, NULL, 0)",
                [candidate_id],
            )?;
            for user_id in [user_a, user_b] {
                tx.execute(
                    "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                    rusqlite::params![candidate_id, user_id],
                )?;
            }
            tx.commit()?;
            Ok((candidate_id.to_string(), true))
        })
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, is_group, last_message_id, last_message_at, created_at
                 FROM chats WHERE id = ?1",
                [id],
                map_chat_row,
            )
            .optional()
        })
    }

    pub fn get_chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.is_group, c.last_message_id, c.last_message_at, c.created_at
                 FROM chats c
                 JOIN chat_participants p ON p.chat_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY COALESCE(c.last_message_at, c.created_at) DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_chat_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
                    rusqlite::params![chat_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_participants(&self, chat_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.user_id, u.username, u.online
                 FROM chat_participants p
                 JOIN users u ON p.user_id = u.id
                 WHERE p.chat_id = ?1",
            )?;
            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(ParticipantRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        online: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Participant ids only — the fan-out path resolves recipients with
    /// this and doesn't need usernames.
    pub fn participant_ids(&self, chat_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM chat_participants WHERE chat_id = ?1")?;
            let rows = stmt
                .query_map([chat_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn add_participant(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![chat_id, user_id],
            )?;
            Ok(())
        })
    }

    pub fn remove_participant(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Delete a chat with everything hanging off it: messages and
    /// participant links cascade; attached file blobs are removed
    /// explicitly (messages must go first because of the FK on file_id).
    pub fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let file_ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT file_id FROM messages WHERE chat_id = ?1 AND file_id IS NOT NULL",
                )?;
                stmt.query_map([chat_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            tx.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?;
            for file_id in &file_ids {
                tx.execute("DELETE FROM files WHERE id = ?1", [file_id])?;
            }
            tx.execute("DELETE FROM chats WHERE id = ?1", [chat_id])?;

            tx.commit()?;
            Ok(())
        })
    }

    // -- Messages --

    /// Insert a message and move the chat's last-message pointer in a
    /// single transaction, so a crash can never leave the chat list
    /// pointing at a message that doesn't exist (or vice versa).
    pub fn insert_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        file_id: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            insert_message_tx(&tx, id, chat_id, sender_id, content, file_id, created_at)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// File-message path: blob record, message row and chat pointer all
    /// commit together or not at all.
    pub fn insert_file_message(
        &self,
        file: &NewFile,
        message_id: &str,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO files (id, owner_id, filename, content_type, size, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    file.id,
                    file.owner_id,
                    file.filename,
                    file.content_type,
                    file.size,
                    file.data,
                    created_at,
                ],
            )?;
            insert_message_tx(
                &tx,
                message_id,
                chat_id,
                sender_id,
                content,
                Some(file.id),
                created_at,
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_messages(
        &self,
        chat_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            // Cursor-based pagination: `before` is the created_at of the
            // oldest message from the previous page.
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&chat_id, &limit];
            let sql = match &before {
                Some(cursor) => {
                    params.push(cursor);
                    format!(
                        "{MESSAGE_SELECT}
                         WHERE m.chat_id = ?1 AND m.is_deleted = 0 AND m.created_at < ?3
                         ORDER BY m.created_at DESC
                         LIMIT ?2"
                    )
                }
                None => format!(
                    "{MESSAGE_SELECT}
                     WHERE m.chat_id = ?1 AND m.is_deleted = 0
                     ORDER BY m.created_at DESC
                     LIMIT ?2"
                ),
            };

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{MESSAGE_SELECT} WHERE m.id = ?1 AND m.is_deleted = 0"),
                [id],
                map_message_row,
            )
            .optional()
        })
    }

    /// Edit a message's text. Returns false if the row is gone or
    /// soft-deleted.
    pub fn update_message(&self, id: &str, content: &str, updated_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?2, updated_at = ?3
                 WHERE id = ?1 AND is_deleted = 0",
                rusqlite::params![id, content, updated_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Soft-delete a message, except that a file message takes its blob
    /// with it — that pair is hard-deleted together.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let file_id: Option<Option<String>> = tx
                .query_row(
                    "SELECT file_id FROM messages WHERE id = ?1 AND is_deleted = 0",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;

            let deleted = match file_id {
                None => false,
                Some(None) => {
                    tx.execute("UPDATE messages SET is_deleted = 1 WHERE id = ?1", [id])?;
                    true
                }
                Some(Some(file_id)) => {
                    tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
                    tx.execute("DELETE FROM files WHERE id = ?1", [&file_id])?;
                    true
                }
            };

            tx.commit()?;
            Ok(deleted)
        })
    }

    /// Mark every message in the chat not sent by `user_id` as read.
    pub fn mark_read(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE chat_id = ?1 AND sender_id != ?2 AND is_read = 0",
                rusqlite::params![chat_id, user_id],
            )?;
            Ok(())
        })
    }

    // -- Files --

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, owner_id, filename, content_type, size, data, created_at
                 FROM files WHERE id = ?1",
                [id],
                |row| {
                    Ok(FileRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        filename: row.get(2)?,
                        content_type: row.get(3)?,
                        size: row.get(4)?,
                        data: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn insert_message_tx(
    tx: &rusqlite::Transaction,
    id: &str,
    chat_id: &str,
    sender_id: &str,
    content: &str,
    file_id: Option<&str>,
    created_at: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO messages (id, chat_id, sender_id, content, file_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id, chat_id, sender_id, content, file_id, created_at],
    )?;
    tx.execute(
        "UPDATE chats SET last_message_id = ?2, last_message_at = ?3 WHERE id = ?1",
        rusqlite::params![chat_id, id, created_at],
    )?;
    Ok(())
}

fn query_user(conn: &Connection, sql: &str, key: &str) -> Result<Option<UserRow>> {
    conn.query_row(sql, [key], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            online: row.get(3)?,
            last_seen: row.get(4)?,
            created_at: row.get(5)?,
        })
    })
    .optional()
}

fn map_chat_row(row: &rusqlite::Row) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        name: row.get(1)?,
        is_group: row.get(2)?,
        last_message_id: row.get(3)?,
        last_message_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_message_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        file_id: row.get(5)?,
        file_name: row.get(6)?,
        file_content_type: row.get(7)?,
        file_size: row.get(8)?,
        is_read: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::now_rfc3339;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn seed_users(db: &Database, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|name| {
                let id = uuid::Uuid::new_v4().to_string();
                db.create_user(&id, name, "hash").unwrap();
                id
            })
            .collect()
    }

    #[test]
    fn user_roundtrip_and_presence() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice"]);

        let user = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(user.id, ids[0]);
        assert!(!user.online);
        assert!(user.last_seen.is_none());

        db.set_presence(&ids[0], true, None).unwrap();
        assert!(db.get_user_by_id(&ids[0]).unwrap().unwrap().online);

        let seen = now_rfc3339();
        db.set_presence(&ids[0], false, Some(&seen)).unwrap();
        let user = db.get_user_by_id(&ids[0]).unwrap().unwrap();
        assert!(!user.online);
        assert_eq!(user.last_seen.as_deref(), Some(seen.as_str()));
    }

    #[test]
    fn membership_checks() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice", "bob", "carol"]);

        db.create_chat("c1", None, false, &ids[..2].to_vec()).unwrap();

        assert!(db.is_participant("c1", &ids[0]).unwrap());
        assert!(db.is_participant("c1", &ids[1]).unwrap());
        assert!(!db.is_participant("c1", &ids[2]).unwrap());

        let mut participants = db.participant_ids("c1").unwrap();
        participants.sort();
        let mut expected = ids[..2].to_vec();
        expected.sort();
        assert_eq!(participants, expected);
    }

    #[test]
    fn find_or_create_private_chat_deduplicates() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice", "bob"]);

        let (chat_id, created) = db.find_or_create_private_chat("c1", &ids[0], &ids[1]).unwrap();
        assert_eq!(chat_id, "c1");
        assert!(created);
        assert!(db.is_participant("c1", &ids[0]).unwrap());
        assert!(db.is_participant("c1", &ids[1]).unwrap());

        // Same pair in either order resolves to the existing chat
        let (again, created) = db.find_or_create_private_chat("c2", &ids[1], &ids[0]).unwrap();
        assert_eq!(again, "c1");
        assert!(!created);
        assert!(db.get_chat("c2").unwrap().is_none());
    }

    #[test]
    fn racing_pair_chat_requests_resolve_to_one_chat() {
        let (db, _dir) = test_db();
        let db = std::sync::Arc::new(db);
        let ids = seed_users(&db, &["alice", "bob"]);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let db = db.clone();
                let (a, b) = (ids[0].clone(), ids[1].clone());
                std::thread::spawn(move || {
                    db.find_or_create_private_chat(&format!("cand{i}"), &a, &b).unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        let winner = &results[0].0;
        assert!(results.iter().all(|(id, _)| id == winner));
        assert_eq!(db.get_chats_for_user(&ids[0]).unwrap().len(), 1);
    }

    #[test]
    fn insert_message_moves_chat_pointer() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice", "bob"]);
        db.create_chat("c1", None, false, &ids.to_vec()).unwrap();

        let ts = now_rfc3339();
        db.insert_message("m1", "c1", &ids[0], "hi", None, &ts).unwrap();

        let chat = db.get_chat("c1").unwrap().unwrap();
        assert_eq!(chat.last_message_id.as_deref(), Some("m1"));
        assert_eq!(chat.last_message_at.as_deref(), Some(ts.as_str()));
    }

    #[test]
    fn history_returns_creation_order() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice", "bob"]);
        db.create_chat("c1", None, false, &ids.to_vec()).unwrap();

        let t1 = now_rfc3339();
        db.insert_message("m1", "c1", &ids[0], "first", None, &t1).unwrap();
        let t2 = now_rfc3339();
        assert!(t2 >= t1);
        db.insert_message("m2", "c1", &ids[1], "second", None, &t2).unwrap();

        // Newest first
        let rows = db.get_messages("c1", 50, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "m2");
        assert_eq!(rows[1].id, "m1");
        assert_eq!(rows[1].sender_username, "alice");

        let chat = db.get_chat("c1").unwrap().unwrap();
        assert_eq!(chat.last_message_id.as_deref(), Some("m2"));
    }

    #[test]
    fn pagination_cursor_skips_newer_messages() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice"]);
        db.create_chat("c1", None, false, &ids.to_vec()).unwrap();

        for i in 0..5 {
            let ts = now_rfc3339();
            db.insert_message(&format!("m{i}"), "c1", &ids[0], "x", None, &ts)
                .unwrap();
        }

        let page1 = db.get_messages("c1", 2, None).unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].id, "m4");

        let cursor = &page1[1].created_at;
        let page2 = db.get_messages("c1", 2, Some(cursor)).unwrap();
        assert_eq!(page2[0].id, "m2");
        assert_eq!(page2[1].id, "m1");
    }

    #[test]
    fn soft_delete_hides_message_but_keeps_row_semantics() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice"]);
        db.create_chat("c1", None, false, &ids.to_vec()).unwrap();

        db.insert_message("m1", "c1", &ids[0], "hi", None, &now_rfc3339()).unwrap();
        assert!(db.delete_message("m1").unwrap());

        assert!(db.get_messages("c1", 50, None).unwrap().is_empty());
        assert!(db.get_message("m1").unwrap().is_none());
        // Second delete finds nothing live
        assert!(!db.delete_message("m1").unwrap());
    }

    #[test]
    fn file_message_hard_deletes_with_blob() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice"]);
        db.create_chat("c1", None, false, &ids.to_vec()).unwrap();

        let file = NewFile {
            id: "f1",
            owner_id: &ids[0],
            filename: "cv.pdf",
            content_type: "application/pdf",
            size: 4,
            data: b"%PDF",
        };
        db.insert_file_message(&file, "m1", "c1", &ids[0], "File: cv.pdf", &now_rfc3339())
            .unwrap();

        let rows = db.get_messages("c1", 50, None).unwrap();
        assert_eq!(rows[0].file_name.as_deref(), Some("cv.pdf"));
        assert_eq!(rows[0].file_size, Some(4));
        assert_eq!(db.get_file("f1").unwrap().unwrap().data, b"%PDF");

        assert!(db.delete_message("m1").unwrap());
        assert!(db.get_file("f1").unwrap().is_none());
    }

    #[test]
    fn delete_chat_cascades_links_and_blobs() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice", "bob"]);
        db.create_chat("c1", Some("project"), true, &ids.to_vec()).unwrap();

        let file = NewFile {
            id: "f1",
            owner_id: &ids[0],
            filename: "brief.txt",
            content_type: "text/plain",
            size: 2,
            data: b"ok",
        };
        db.insert_file_message(&file, "m1", "c1", &ids[0], "File: brief.txt", &now_rfc3339())
            .unwrap();

        db.delete_chat("c1").unwrap();

        assert!(db.get_chat("c1").unwrap().is_none());
        assert!(db.participant_ids("c1").unwrap().is_empty());
        assert!(db.get_file("f1").unwrap().is_none());
        assert!(db.get_chats_for_user(&ids[0]).unwrap().is_empty());
    }

    #[test]
    fn mark_read_spares_own_messages() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice", "bob"]);
        db.create_chat("c1", None, false, &ids.to_vec()).unwrap();

        db.insert_message("m1", "c1", &ids[0], "from alice", None, &now_rfc3339()).unwrap();
        db.insert_message("m2", "c1", &ids[1], "from bob", None, &now_rfc3339()).unwrap();

        db.mark_read("c1", &ids[1]).unwrap();

        let rows = db.get_messages("c1", 50, None).unwrap();
        let m1 = rows.iter().find(|r| r.id == "m1").unwrap();
        let m2 = rows.iter().find(|r| r.id == "m2").unwrap();
        assert!(m1.is_read);
        assert!(!m2.is_read);
    }

    #[test]
    fn edit_updates_content_and_timestamp() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice"]);
        db.create_chat("c1", None, false, &ids.to_vec()).unwrap();
        db.insert_message("m1", "c1", &ids[0], "helo", None, &now_rfc3339()).unwrap();

        let edit_ts = now_rfc3339();
        assert!(db.update_message("m1", "hello", &edit_ts).unwrap());

        let row = db.get_message("m1").unwrap().unwrap();
        assert_eq!(row.content, "hello");
        assert_eq!(row.updated_at.as_deref(), Some(edit_ts.as_str()));

        assert!(!db.update_message("missing", "x", &edit_ts).unwrap());
    }

    #[test]
    fn leave_and_add_participants() {
        let (db, _dir) = test_db();
        let ids = seed_users(&db, &["alice", "bob", "carol"]);
        db.create_chat("c1", Some("team"), true, &ids[..2].to_vec()).unwrap();

        db.add_participant("c1", &ids[2]).unwrap();
        assert!(db.is_participant("c1", &ids[2]).unwrap());
        // Idempotent
        db.add_participant("c1", &ids[2]).unwrap();
        assert_eq!(db.participant_ids("c1").unwrap().len(), 3);

        db.remove_participant("c1", &ids[0]).unwrap();
        assert!(!db.is_participant("c1", &ids[0]).unwrap());
    }
}
