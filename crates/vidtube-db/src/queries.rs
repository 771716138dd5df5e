use crate::Database;
use crate::models::{ChannelProfileRow, NewUser, UserRow, now_timestamp};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, password, refresh_token, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser) -> Result<()> {
        self.with_conn(|conn| {
            let now = now_timestamp();
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, avatar, cover_image, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.email,
                    user.full_name,
                    user.avatar,
                    user.cover_image,
                    user.password_hash,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Matches a user whose username equals `username` or whose email equals
    /// `email`. Either side may be absent; a `None` never matches.
    pub fn find_user_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR email = ?2 LIMIT 1"
            );
            conn.query_row(&sql, rusqlite::params![username, email], map_user_row)
                .optional()
        })
    }

    // -- Narrow field updates --
    //
    // Each of these touches only the named columns. They never re-check the
    // rest of the record.

    /// Overwrites the stored refresh token. `None` ends the session.
    /// Returns false if no such user exists.
    pub fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, token, now_timestamp()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Swaps the stored refresh token for `new` only if it still equals
    /// `expected`. Returns false when another rotation or a logout got there
    /// first.
    pub fn replace_refresh_token(&self, id: &str, expected: &str, new: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?3, updated_at = ?4
                 WHERE id = ?1 AND refresh_token = ?2",
                rusqlite::params![id, expected, new, now_timestamp()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn set_password(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, password_hash, now_timestamp()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn update_account(&self, id: &str, full_name: &str, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET full_name = ?2, email = ?3, updated_at = ?4 WHERE id = ?1",
                rusqlite::params![id, full_name, email, now_timestamp()],
            )?;
            query_user_by_id(conn, id)
        })
    }

    pub fn set_avatar(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET avatar = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, url, now_timestamp()],
            )?;
            query_user_by_id(conn, id)
        })
    }

    pub fn set_cover_image(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET cover_image = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, url, now_timestamp()],
            )?;
            query_user_by_id(conn, id)
        })
    }

    // -- Subscriptions --

    pub fn create_subscription(&self, subscriber_id: &str, channel_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO subscriptions (subscriber_id, channel_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![subscriber_id, channel_id, now_timestamp()],
            )?;
            Ok(())
        })
    }

    /// Public channel view of `username` (already lowercased) in one
    /// statement: subscriber count, subscribed-to count, and whether
    /// `viewer_id` is among the subscribers. A `None` viewer is never
    /// subscribed.
    pub fn get_channel_profile(
        &self,
        username: &str,
        viewer_id: Option<&str>,
    ) -> Result<Option<ChannelProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT u.full_name, u.username,
                        (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id),
                        (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id),
                        EXISTS (SELECT 1 FROM subscriptions s
                                WHERE s.channel_id = u.id AND s.subscriber_id = ?2),
                        u.avatar, u.cover_image, u.email
                 FROM users u
                 WHERE u.username = ?1",
                rusqlite::params![username, viewer_id],
                |row| {
                    Ok(ChannelProfileRow {
                        full_name: row.get(0)?,
                        username: row.get(1)?,
                        subscribers_count: row.get(2)?,
                        channels_subscribed_to_count: row.get(3)?,
                        is_subscribed: row.get(4)?,
                        avatar: row.get(5)?,
                        cover_image: row.get(6)?,
                        email: row.get(7)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, [id], map_user_row).optional()
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        avatar: row.get(4)?,
        cover_image: row.get(5)?,
        password: row.get(6)?,
        refresh_token: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
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
