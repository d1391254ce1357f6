use rusqlite::{params, ErrorCode, OptionalExtension, Row};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub password: &'a str,
    pub bio: Option<&'a str>,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, bio, profile_image, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        bio: row.get(4)?,
        profile_image: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Insert a user with a bcrypt-hashed password. Returns the new user id, or
/// `Conflict` when the username or email is taken.
pub fn create_user(pool: &DbPool, new_user: &NewUser<'_>, cost: u32) -> AppResult<i64> {
    let password_hash = bcrypt::hash(new_user.password, cost)?;
    let conn = pool.get()?;

    let result = conn.execute(
        "INSERT INTO users (username, email, password_hash, bio) VALUES (?1, ?2, ?3, ?4)",
        params![new_user.username, new_user.email, password_hash, new_user.bio],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(AppError::Conflict("Username or email already taken".into()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn find_by_id(pool: &DbPool, id: i64) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_username(pool: &DbPool, username: &str) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Check a username/password pair. Unknown users and wrong passwords are
/// indistinguishable to the caller.
pub fn authenticate(pool: &DbPool, username: &str, password: &str) -> AppResult<User> {
    let user = find_by_username(pool, username)?.ok_or(AppError::Unauthorized)?;

    if bcrypt::verify(password, &user.password_hash)? {
        Ok(user)
    } else {
        Err(AppError::Unauthorized)
    }
}
