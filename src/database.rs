use rusqlite::{Connection, ErrorCode, OptionalExtension, Result, Row};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::types::{
    ChatMessageRow, DrawRecord, DrawRow, LatestRecommendation, LotteryFilter, LotteryListing,
    LotteryRecord, LotteryRow, LotteryStatistics, LotterySummary, PrizeCategoryRecord,
    PrizeCategoryRow, Recommendation, RecommendationRow, UserPreferences,
};

const LOTTERY_COLUMNS: &str = "l.id, l.name, l.slug, l.lottery_type, l.ticket_price, \
     l.draw_frequency, l.description, l.max_prize, l.url, l.is_active";

pub fn open(database_url: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(database_url).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create {}: {}", parent.display(), e)),
                )
            })?;
        }
    }

    let conn = Connection::open(database_url)?;
    create_tables(&conn)?;
    info!("📁 Opened store at {}", database_url);
    Ok(conn)
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lotteries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            lottery_type TEXT NOT NULL,
            ticket_price REAL,
            draw_frequency TEXT,
            description TEXT,
            max_prize REAL,
            url TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS draws (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lottery_id INTEGER NOT NULL,
            draw_number INTEGER NOT NULL,
            draw_date TEXT,
            draw_day TEXT,
            winning_numbers TEXT,
            total_prize_fund REAL,
            winners_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (lottery_id, draw_number),
            FOREIGN KEY (lottery_id) REFERENCES lotteries (id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS prize_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            draw_id INTEGER NOT NULL,
            lottery_id INTEGER NOT NULL,
            category_name TEXT NOT NULL,
            prize_amount REAL,
            winners_count INTEGER,
            probability REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (draw_id) REFERENCES draws (id),
            FOREIGN KEY (lottery_id) REFERENCES lotteries (id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_preferences (
            user_id INTEGER PRIMARY KEY,
            budget REAL,
            preferred_prize_type TEXT,
            preferred_prize_size TEXT,
            min_acceptable_probability REAL,
            risk_profile TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS recommendations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            lottery_id INTEGER NOT NULL,
            score REAL NOT NULL,
            explanation TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (lottery_id) REFERENCES lotteries (id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chat_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            message TEXT NOT NULL,
            is_user_message INTEGER NOT NULL,
            context_data TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_prize_categories_draw ON prize_categories (draw_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chat_history_user ON chat_history (user_id, id)",
        [],
    )?;

    Ok(())
}

/// Failures that mean the store itself is unusable, as opposed to one bad record.
pub fn is_connection_failure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
        ),
        _ => false,
    }
}

/// Reads the ten `LOTTERY_COLUMNS` starting at column 1.
fn lottery_record(row: &Row) -> Result<LotteryRecord> {
    Ok(LotteryRecord {
        name: row.get(1)?,
        slug: row.get(2)?,
        lottery_type: row.get(3)?,
        ticket_price: row.get(4)?,
        draw_frequency: row.get(5)?,
        description: row.get(6)?,
        max_prize: row.get(7)?,
        url: row.get(8)?,
        is_active: row.get(9)?,
    })
}

/// Inserts or refreshes a lottery by slug; name, id and created_at survive a refresh.
pub fn upsert_lottery(conn: &Connection, lottery: &LotteryRecord) -> Result<i64> {
    conn.query_row(
        "INSERT INTO lotteries (
            name, slug, lottery_type, ticket_price, draw_frequency,
            description, max_prize, url, is_active
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(slug) DO UPDATE SET
            ticket_price = excluded.ticket_price,
            draw_frequency = excluded.draw_frequency,
            description = excluded.description,
            max_prize = excluded.max_prize,
            updated_at = CURRENT_TIMESTAMP
        RETURNING id",
        (
            &lottery.name,
            &lottery.slug,
            lottery.lottery_type,
            lottery.ticket_price,
            &lottery.draw_frequency,
            &lottery.description,
            lottery.max_prize,
            &lottery.url,
            lottery.is_active,
        ),
        |row| row.get(0),
    )
}

/// Returns whether a row was inserted.
pub fn insert_lottery_if_absent(conn: &Connection, lottery: &LotteryRecord) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO lotteries (
            name, slug, lottery_type, ticket_price, draw_frequency,
            description, max_prize, url, is_active
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(slug) DO NOTHING",
        (
            &lottery.name,
            &lottery.slug,
            lottery.lottery_type,
            lottery.ticket_price,
            &lottery.draw_frequency,
            &lottery.description,
            lottery.max_prize,
            &lottery.url,
            lottery.is_active,
        ),
    )?;
    Ok(inserted > 0)
}

fn lottery_row(row: &Row) -> Result<LotteryRow> {
    Ok(LotteryRow {
        id: row.get(0)?,
        record: lottery_record(row)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn list_lotteries(conn: &Connection, active_only: bool) -> Result<Vec<LotteryRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, l.created_at, l.updated_at FROM lotteries l
         WHERE (?1 = 0 OR l.is_active = 1) ORDER BY l.name",
        LOTTERY_COLUMNS
    ))?;
    let lottery_iter = stmt.query_map([active_only], lottery_row)?;

    let mut results = Vec::new();
    for lottery in lottery_iter {
        results.push(lottery?);
    }
    Ok(results)
}

pub fn get_lottery_by_id(conn: &Connection, lottery_id: i64) -> Result<Option<LotteryRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, l.created_at, l.updated_at FROM lotteries l WHERE l.id = ?1",
        LOTTERY_COLUMNS
    ))?;
    stmt.query_row([lottery_id], lottery_row).optional()
}

pub fn get_lottery_by_slug(conn: &Connection, slug: &str) -> Result<Option<LotteryRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, l.created_at, l.updated_at FROM lotteries l WHERE l.slug = ?1",
        LOTTERY_COLUMNS
    ))?;
    stmt.query_row([slug], lottery_row).optional()
}

/// Catalog listing with per-lottery draw statistics, ordered by name.
pub fn search_lotteries(conn: &Connection, filter: &LotteryFilter) -> Result<Vec<LotteryListing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, l.created_at, l.updated_at,
            COUNT(DISTINCT d.id), AVG(d.total_prize_fund)
         FROM lotteries l
         LEFT JOIN draws d ON d.lottery_id = l.id
         WHERE (?1 = 0 OR l.is_active = 1)
           AND (?2 IS NULL OR l.lottery_type = ?2)
           AND (?3 IS NULL OR l.ticket_price >= ?3)
           AND (?4 IS NULL OR l.ticket_price <= ?4)
         GROUP BY l.id
         ORDER BY l.name",
        LOTTERY_COLUMNS
    ))?;
    let listing_iter = stmt.query_map(
        (
            filter.active_only,
            filter.lottery_type,
            filter.min_price,
            filter.max_price,
        ),
        |row| {
            Ok(LotteryListing {
                lottery: lottery_row(row)?,
                statistics: LotteryStatistics {
                    total_draws: row.get(12)?,
                    avg_prize_fund: row.get(13)?,
                },
            })
        },
    )?;

    let mut results = Vec::new();
    for listing in listing_iter {
        results.push(listing?);
    }
    Ok(results)
}

fn lottery_summary(row: &Row) -> Result<LotterySummary> {
    Ok(LotterySummary {
        id: row.get(0)?,
        record: lottery_record(row)?,
        avg_win_probability: row.get(10)?,
        total_draws: row.get(11)?,
    })
}

/// Active lotteries with their probability and draw-count aggregates, in id order.
pub fn get_active_lottery_summaries(conn: &Connection) -> Result<Vec<LotterySummary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {},
            (SELECT AVG(pc.probability) FROM prize_categories pc WHERE pc.lottery_id = l.id),
            (SELECT COUNT(*) FROM draws d WHERE d.lottery_id = l.id)
         FROM lotteries l
         WHERE l.is_active = 1
         ORDER BY l.id",
        LOTTERY_COLUMNS
    ))?;
    let summary_iter = stmt.query_map([], lottery_summary)?;

    let mut results = Vec::new();
    for summary in summary_iter {
        results.push(summary?);
    }
    Ok(results)
}

/// Active lotteries ordered by how often they were recommended, then by name.
pub fn get_popular_lotteries(conn: &Connection, limit: usize) -> Result<Vec<LotterySummary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {},
            (SELECT AVG(pc.probability) FROM prize_categories pc WHERE pc.lottery_id = l.id),
            (SELECT COUNT(*) FROM draws d WHERE d.lottery_id = l.id)
         FROM lotteries l
         LEFT JOIN recommendations r ON r.lottery_id = l.id
         WHERE l.is_active = 1
         GROUP BY l.id
         ORDER BY COUNT(r.id) DESC, l.name
         LIMIT ?1",
        LOTTERY_COLUMNS
    ))?;
    let summary_iter = stmt.query_map([limit as i64], lottery_summary)?;

    let mut results = Vec::new();
    for summary in summary_iter {
        results.push(summary?);
    }
    Ok(results)
}

pub fn upsert_draw(conn: &Connection, draw: &DrawRecord) -> Result<i64> {
    let draw_day = draw.draw_day.map(|day| day.format("%Y-%m-%d").to_string());

    conn.query_row(
        "INSERT INTO draws (
            lottery_id, draw_number, draw_date, draw_day,
            winning_numbers, total_prize_fund, winners_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(lottery_id, draw_number) DO UPDATE SET
            winning_numbers = excluded.winning_numbers,
            total_prize_fund = excluded.total_prize_fund,
            winners_count = excluded.winners_count
        RETURNING id",
        (
            draw.lottery_id,
            draw.draw_number,
            &draw.draw_date,
            &draw_day,
            &draw.winning_numbers,
            draw.total_prize_fund,
            draw.winners_count,
        ),
        |row| row.get(0),
    )
}

fn delete_and_insert_categories(
    conn: &Connection,
    draw_id: i64,
    categories: &[PrizeCategoryRecord],
) -> Result<()> {
    conn.execute("DELETE FROM prize_categories WHERE draw_id = ?1", [draw_id])?;

    let mut stmt = conn.prepare(
        "INSERT INTO prize_categories (
            draw_id, lottery_id, category_name, prize_amount, winners_count, probability
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for category in categories {
        stmt.execute((
            draw_id,
            category.lottery_id,
            &category.category_name,
            category.prize_amount,
            category.winners_count,
            category.probability,
        ))?;
    }
    Ok(())
}

/// Replaces every prize category of a draw atomically.
pub fn replace_prize_categories(
    conn: &Connection,
    draw_id: i64,
    categories: &[PrizeCategoryRecord],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    delete_and_insert_categories(&tx, draw_id, categories)?;
    tx.commit()
}

/// Upserts the draw and replaces its categories in one transaction.
pub fn save_draw(
    conn: &Connection,
    draw: &DrawRecord,
    categories: &[PrizeCategoryRecord],
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let draw_id = upsert_draw(&tx, draw)?;
    delete_and_insert_categories(&tx, draw_id, categories)?;
    tx.commit()?;
    Ok(draw_id)
}

pub fn get_draws_by_lottery(
    conn: &Connection,
    lottery_id: i64,
    limit: Option<i32>,
) -> Result<Vec<DrawRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, lottery_id, draw_number, draw_date, draw_day,
                winning_numbers, total_prize_fund, winners_count
         FROM draws WHERE lottery_id = ?1
         ORDER BY draw_number DESC
         LIMIT ?2",
    )?;
    let draw_iter = stmt.query_map((lottery_id, limit.unwrap_or(-1)), |row| {
        Ok(DrawRow {
            id: row.get(0)?,
            lottery_id: row.get(1)?,
            draw_number: row.get(2)?,
            draw_date: row.get(3)?,
            draw_day: row.get(4)?,
            winning_numbers: row.get(5)?,
            total_prize_fund: row.get(6)?,
            winners_count: row.get(7)?,
        })
    })?;

    let mut results = Vec::new();
    for draw in draw_iter {
        results.push(draw?);
    }
    Ok(results)
}

pub fn get_prize_categories_by_draw(conn: &Connection, draw_id: i64) -> Result<Vec<PrizeCategoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, draw_id, lottery_id, category_name, prize_amount, winners_count, probability
         FROM prize_categories WHERE draw_id = ?1 ORDER BY id",
    )?;
    let category_iter = stmt.query_map([draw_id], |row| {
        Ok(PrizeCategoryRow {
            id: row.get(0)?,
            draw_id: row.get(1)?,
            lottery_id: row.get(2)?,
            category_name: row.get(3)?,
            prize_amount: row.get(4)?,
            winners_count: row.get(5)?,
            probability: row.get(6)?,
        })
    })?;

    let mut results = Vec::new();
    for category in category_iter {
        results.push(category?);
    }
    Ok(results)
}

pub fn get_user_preferences(conn: &Connection, user_id: i64) -> Result<Option<UserPreferences>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, budget, preferred_prize_type, preferred_prize_size,
                min_acceptable_probability, risk_profile
         FROM user_preferences WHERE user_id = ?1",
    )?;
    stmt.query_row([user_id], |row| {
        Ok(UserPreferences {
            user_id: row.get(0)?,
            budget: row.get(1)?,
            preferred_prize_type: row.get(2)?,
            preferred_prize_size: row.get(3)?,
            min_acceptable_probability: row.get(4)?,
            risk_profile: row.get(5)?,
        })
    })
    .optional()
}

/// Returns whether the user had preferences to delete.
pub fn delete_user_preferences(conn: &Connection, user_id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM user_preferences WHERE user_id = ?1", [user_id])?;
    Ok(deleted > 0)
}

pub fn upsert_user_preferences(conn: &Connection, prefs: &UserPreferences) -> Result<()> {
    conn.execute(
        "INSERT INTO user_preferences (
            user_id, budget, preferred_prize_type, preferred_prize_size,
            min_acceptable_probability, risk_profile
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(user_id) DO UPDATE SET
            budget = excluded.budget,
            preferred_prize_type = excluded.preferred_prize_type,
            preferred_prize_size = excluded.preferred_prize_size,
            min_acceptable_probability = excluded.min_acceptable_probability,
            risk_profile = excluded.risk_profile,
            updated_at = CURRENT_TIMESTAMP",
        (
            prefs.user_id,
            prefs.budget,
            prefs.preferred_prize_type,
            prefs.preferred_prize_size,
            prefs.min_acceptable_probability,
            prefs.risk_profile,
        ),
    )?;
    Ok(())
}

/// Appends a batch of recommendations for one user atomically.
pub fn save_recommendations(
    conn: &Connection,
    user_id: i64,
    recommendations: &[Recommendation],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO recommendations (user_id, lottery_id, score, explanation)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for rec in recommendations {
            stmt.execute((user_id, rec.lottery.id, rec.score, &rec.explanation))?;
        }
    }
    tx.commit()
}

pub fn get_recent_recommendations(
    conn: &Connection,
    user_id: i64,
    limit: i32,
) -> Result<Vec<RecommendationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, lottery_id, score, explanation, created_at
         FROM recommendations WHERE user_id = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rec_iter = stmt.query_map((user_id, limit), |row| {
        Ok(RecommendationRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            lottery_id: row.get(2)?,
            score: row.get(3)?,
            explanation: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    let mut results = Vec::new();
    for rec in rec_iter {
        results.push(rec?);
    }
    Ok(results)
}

/// The newest recommendation per active lottery, best score first.
pub fn get_latest_recommendations(
    conn: &Connection,
    user_id: i64,
    limit: usize,
) -> Result<Vec<LatestRecommendation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, r.score, r.explanation, r.created_at
         FROM recommendations r
         JOIN lotteries l ON l.id = r.lottery_id
         WHERE r.user_id = ?1
           AND l.is_active = 1
           AND r.id = (
               SELECT MAX(latest.id) FROM recommendations latest
               WHERE latest.user_id = r.user_id AND latest.lottery_id = r.lottery_id
           )
         ORDER BY r.score DESC, l.id
         LIMIT ?2",
        LOTTERY_COLUMNS
    ))?;
    let rec_iter = stmt.query_map((user_id, limit as i64), |row| {
        Ok(LatestRecommendation {
            lottery_id: row.get(0)?,
            lottery: lottery_record(row)?,
            score: row.get(10)?,
            explanation: row.get(11)?,
            created_at: row.get(12)?,
        })
    })?;

    let mut results = Vec::new();
    for rec in rec_iter {
        results.push(rec?);
    }
    Ok(results)
}

pub fn append_chat_message(
    conn: &Connection,
    user_id: i64,
    message: &str,
    is_user_message: bool,
    context_data: Option<&str>,
) -> Result<i64> {
    conn.query_row(
        "INSERT INTO chat_history (user_id, message, is_user_message, context_data)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id",
        (user_id, message, is_user_message, context_data),
        |row| row.get(0),
    )
}

/// One page of a user's chat, counted back from the newest message and
/// returned oldest first.
pub fn get_chat_history(
    conn: &Connection,
    user_id: i64,
    limit: usize,
    offset: usize,
) -> Result<Vec<ChatMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, message, is_user_message, created_at
         FROM chat_history WHERE user_id = ?1
         ORDER BY id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let message_iter = stmt.query_map((user_id, limit as i64, offset as i64), |row| {
        Ok(ChatMessageRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            message: row.get(2)?,
            is_user_message: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;

    let mut results = Vec::new();
    for message in message_iter {
        results.push(message?);
    }
    results.reverse();
    Ok(results)
}

pub fn count_chat_messages(conn: &Connection, user_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM chat_history WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )
}

/// Returns the number of deleted messages.
pub fn clear_chat_history(conn: &Connection, user_id: i64) -> Result<usize> {
    conn.execute("DELETE FROM chat_history WHERE user_id = ?1", [user_id])
}
