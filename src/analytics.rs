//! Read-only aggregates over the lottery store.

use rusqlite::{Connection, OptionalExtension, Result};
use serde::Serialize;

const RECENT_DRAWS: i64 = 5;
const TREND_MONTHS: i64 = 12;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogSummary {
    pub total_active_lotteries: i64,
    pub instant_lotteries: i64,
    pub draw_lotteries: i64,
    pub avg_ticket_price: Option<f64>,
    pub min_ticket_price: Option<f64>,
    pub max_ticket_price: Option<f64>,
    pub avg_max_prize: Option<f64>,
    pub biggest_jackpot: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawTotals {
    pub total_draws: i64,
    pub total_prize_fund_distributed: f64,
    pub total_winners: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentDraw {
    pub lottery_name: String,
    pub draw_number: i64,
    pub date: Option<String>,
    pub prize_fund: Option<f64>,
    pub winners: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub summary: CatalogSummary,
    pub total_statistics: DrawTotals,
    pub recent_activity: Vec<RecentDraw>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawStatistics {
    pub total_draws: i64,
    pub avg_prize_fund: Option<f64>,
    pub max_prize_fund: Option<f64>,
    pub min_prize_fund: Option<f64>,
    pub total_winners: i64,
    pub avg_winners_per_draw: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStatistics {
    pub category: String,
    pub occurrences: i64,
    pub avg_prize: Option<f64>,
    pub max_prize: Option<f64>,
    pub avg_probability: Option<f64>,
    pub total_winners: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    /// `YYYY-MM`
    pub month: String,
    pub draws_count: i64,
    pub avg_prize_fund: Option<f64>,
    pub total_winners: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotteryAnalytics {
    pub lottery_id: i64,
    pub lottery_name: String,
    pub draw_statistics: DrawStatistics,
    pub prize_categories: Vec<CategoryStatistics>,
    pub monthly_trends: Vec<MonthlyTrend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryProbability {
    pub category: String,
    pub probability: f64,
    pub probability_percentage: f64,
    pub avg_prize: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinProbability {
    pub lottery_id: i64,
    /// `None` when no category has a known probability.
    pub overall_win_probability: Option<f64>,
    pub probabilities_by_category: Vec<CategoryProbability>,
}

pub fn summary_statistics(conn: &Connection) -> Result<SummaryStatistics> {
    let summary = conn.query_row(
        "SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE lottery_type = 'instant'),
            COUNT(*) FILTER (WHERE lottery_type = 'draw'),
            AVG(ticket_price),
            MIN(ticket_price),
            MAX(ticket_price),
            AVG(max_prize),
            MAX(max_prize)
         FROM lotteries
         WHERE is_active = 1",
        [],
        |row| {
            Ok(CatalogSummary {
                total_active_lotteries: row.get(0)?,
                instant_lotteries: row.get(1)?,
                draw_lotteries: row.get(2)?,
                avg_ticket_price: row.get(3)?,
                min_ticket_price: row.get(4)?,
                max_ticket_price: row.get(5)?,
                avg_max_prize: row.get(6)?,
                biggest_jackpot: row.get(7)?,
            })
        },
    )?;

    let total_statistics = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(total_prize_fund), 0.0), COALESCE(SUM(winners_count), 0)
         FROM draws",
        [],
        |row| {
            Ok(DrawTotals {
                total_draws: row.get(0)?,
                total_prize_fund_distributed: row.get(1)?,
                total_winners: row.get(2)?,
            })
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT l.name, d.draw_number, d.draw_date, d.total_prize_fund, d.winners_count
         FROM draws d
         JOIN lotteries l ON d.lottery_id = l.id
         ORDER BY COALESCE(d.draw_day, d.draw_date) DESC, d.id DESC
         LIMIT ?1",
    )?;
    let recent_iter = stmt.query_map([RECENT_DRAWS], |row| {
        Ok(RecentDraw {
            lottery_name: row.get(0)?,
            draw_number: row.get(1)?,
            date: row.get(2)?,
            prize_fund: row.get(3)?,
            winners: row.get(4)?,
        })
    })?;

    let mut recent_activity = Vec::new();
    for draw in recent_iter {
        recent_activity.push(draw?);
    }

    Ok(SummaryStatistics {
        summary,
        total_statistics,
        recent_activity,
    })
}

/// Per-lottery breakdown; `None` when the lottery does not exist.
pub fn lottery_analytics(conn: &Connection, lottery_id: i64) -> Result<Option<LotteryAnalytics>> {
    let lottery_name: Option<String> = conn
        .query_row("SELECT name FROM lotteries WHERE id = ?1", [lottery_id], |row| {
            row.get(0)
        })
        .optional()?;
    let Some(lottery_name) = lottery_name else {
        return Ok(None);
    };

    let draw_statistics = conn.query_row(
        "SELECT
            COUNT(*),
            AVG(total_prize_fund),
            MAX(total_prize_fund),
            MIN(total_prize_fund),
            COALESCE(SUM(winners_count), 0),
            AVG(winners_count)
         FROM draws
         WHERE lottery_id = ?1",
        [lottery_id],
        |row| {
            Ok(DrawStatistics {
                total_draws: row.get(0)?,
                avg_prize_fund: row.get(1)?,
                max_prize_fund: row.get(2)?,
                min_prize_fund: row.get(3)?,
                total_winners: row.get(4)?,
                avg_winners_per_draw: row.get(5)?,
            })
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT
            category_name,
            COUNT(*),
            AVG(prize_amount),
            MAX(prize_amount),
            AVG(probability),
            COALESCE(SUM(winners_count), 0)
         FROM prize_categories
         WHERE lottery_id = ?1
         GROUP BY category_name
         ORDER BY AVG(prize_amount) DESC",
    )?;
    let category_iter = stmt.query_map([lottery_id], |row| {
        Ok(CategoryStatistics {
            category: row.get(0)?,
            occurrences: row.get(1)?,
            avg_prize: row.get(2)?,
            max_prize: row.get(3)?,
            avg_probability: row.get(4)?,
            total_winners: row.get(5)?,
        })
    })?;

    let mut prize_categories = Vec::new();
    for category in category_iter {
        prize_categories.push(category?);
    }

    let mut stmt = conn.prepare(
        "SELECT
            substr(draw_day, 1, 7) AS month,
            COUNT(*),
            AVG(total_prize_fund),
            COALESCE(SUM(winners_count), 0)
         FROM draws
         WHERE lottery_id = ?1 AND draw_day IS NOT NULL
         GROUP BY month
         ORDER BY month DESC
         LIMIT ?2",
    )?;
    let trend_iter = stmt.query_map((lottery_id, TREND_MONTHS), |row| {
        Ok(MonthlyTrend {
            month: row.get(0)?,
            draws_count: row.get(1)?,
            avg_prize_fund: row.get(2)?,
            total_winners: row.get(3)?,
        })
    })?;

    let mut monthly_trends = Vec::new();
    for trend in trend_iter {
        monthly_trends.push(trend?);
    }

    Ok(Some(LotteryAnalytics {
        lottery_id,
        lottery_name,
        draw_statistics,
        prize_categories,
        monthly_trends,
    }))
}

pub fn win_probability(conn: &Connection, lottery_id: i64) -> Result<WinProbability> {
    let mut stmt = conn.prepare(
        "SELECT category_name, AVG(probability) AS avg_probability, AVG(prize_amount)
         FROM prize_categories
         WHERE lottery_id = ?1 AND probability IS NOT NULL
         GROUP BY category_name
         ORDER BY avg_probability DESC",
    )?;
    let probability_iter = stmt.query_map([lottery_id], |row| {
        let probability: f64 = row.get(1)?;
        Ok(CategoryProbability {
            category: row.get(0)?,
            probability,
            probability_percentage: probability * 100.0,
            avg_prize: row.get(2)?,
        })
    })?;

    let mut probabilities_by_category = Vec::new();
    for probability in probability_iter {
        probabilities_by_category.push(probability?);
    }

    let overall_win_probability = if probabilities_by_category.is_empty() {
        None
    } else {
        Some(probabilities_by_category.iter().map(|p| p.probability).sum())
    };

    Ok(WinProbability {
        lottery_id,
        overall_win_probability,
        probabilities_by_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::{memory_store, sample_lottery};
    use crate::database::{save_draw, upsert_lottery};
    use crate::types::{DrawRecord, LotteryType, PrizeCategoryRecord};
    use chrono::NaiveDate;

    fn draw(lottery_id: i64, number: i64, day: Option<(i32, u32, u32)>, fund: Option<f64>, winners: i64) -> DrawRecord {
        let draw_day = day.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        DrawRecord {
            lottery_id,
            draw_number: number,
            draw_date: draw_day.map(|d| d.to_string()),
            draw_day,
            winning_numbers: None,
            total_prize_fund: fund,
            winners_count: winners,
        }
    }

    fn category(lottery_id: i64, name: &str, amount: f64, probability: Option<f64>) -> PrizeCategoryRecord {
        PrizeCategoryRecord {
            lottery_id,
            category_name: name.to_string(),
            prize_amount: Some(amount),
            winners_count: Some(1),
            probability,
        }
    }

    fn seeded() -> (Connection, i64) {
        let conn = memory_store();
        let id = upsert_lottery(&conn, &sample_lottery("rusloto", LotteryType::Draw)).unwrap();
        let mut instant = sample_lottery("gold", LotteryType::Instant);
        instant.ticket_price = Some(50.0);
        instant.max_prize = Some(3_000_000.0);
        upsert_lottery(&conn, &instant).unwrap();

        save_draw(
            &conn,
            &draw(id, 1, Some((2024, 4, 28)), Some(1000.0), 2),
            &[category(id, "Джекпот", 900.0, None), category(id, "Кон 1", 100.0, Some(0.1))],
        )
        .unwrap();
        save_draw(
            &conn,
            &draw(id, 2, Some((2024, 5, 5)), Some(3000.0), 4),
            &[category(id, "Кон 1", 300.0, Some(0.3))],
        )
        .unwrap();
        save_draw(&conn, &draw(id, 3, None, None, 0), &[]).unwrap();
        (conn, id)
    }

    #[test]
    fn test_summary_statistics() {
        let (conn, _) = seeded();
        let stats = summary_statistics(&conn).unwrap();

        assert_eq!(stats.summary.total_active_lotteries, 2);
        assert_eq!(stats.summary.instant_lotteries, 1);
        assert_eq!(stats.summary.draw_lotteries, 1);
        assert_eq!(stats.summary.avg_ticket_price, Some(75.0));
        assert_eq!(stats.summary.min_ticket_price, Some(50.0));
        assert_eq!(stats.summary.biggest_jackpot, Some(3_000_000.0));

        assert_eq!(stats.total_statistics.total_draws, 3);
        assert_eq!(stats.total_statistics.total_prize_fund_distributed, 4000.0);
        assert_eq!(stats.total_statistics.total_winners, 6);

        assert_eq!(stats.recent_activity.len(), 3);
        assert_eq!(stats.recent_activity[0].draw_number, 2);
    }

    #[test]
    fn test_summary_on_empty_store() {
        let conn = memory_store();
        let stats = summary_statistics(&conn).unwrap();
        assert_eq!(stats.summary, CatalogSummary::default());
        assert_eq!(stats.total_statistics, DrawTotals::default());
        assert!(stats.recent_activity.is_empty());
    }

    #[test]
    fn test_lottery_analytics() {
        let (conn, id) = seeded();
        let analytics = lottery_analytics(&conn, id).unwrap().unwrap();

        assert_eq!(analytics.lottery_name, "Lottery rusloto");
        assert_eq!(analytics.draw_statistics.total_draws, 3);
        assert_eq!(analytics.draw_statistics.max_prize_fund, Some(3000.0));
        assert_eq!(analytics.draw_statistics.avg_prize_fund, Some(2000.0));
        assert_eq!(analytics.draw_statistics.total_winners, 6);

        assert_eq!(analytics.prize_categories.len(), 2);
        assert_eq!(analytics.prize_categories[0].category, "Джекпот");
        let kon = &analytics.prize_categories[1];
        assert_eq!(kon.occurrences, 2);
        assert_eq!(kon.avg_prize, Some(200.0));
        assert_eq!(kon.max_prize, Some(300.0));

        let months: Vec<&str> = analytics.monthly_trends.iter().map(|t| t.month.as_str()).collect();
        assert_eq!(months, vec!["2024-05", "2024-04"]);
    }

    #[test]
    fn test_unknown_lottery_has_no_analytics() {
        let conn = memory_store();
        assert!(lottery_analytics(&conn, 99).unwrap().is_none());
    }

    #[test]
    fn test_win_probability() {
        let (conn, id) = seeded();
        let result = win_probability(&conn, id).unwrap();

        assert_eq!(result.probabilities_by_category.len(), 1);
        let kon = &result.probabilities_by_category[0];
        assert_eq!(kon.category, "Кон 1");
        assert!((kon.probability - 0.2).abs() < 1e-9);
        assert!((result.overall_win_probability.unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_win_probability_without_data() {
        let conn = memory_store();
        let id = upsert_lottery(&conn, &sample_lottery("rapido", LotteryType::Draw)).unwrap();
        let result = win_probability(&conn, id).unwrap();
        assert!(result.overall_win_probability.is_none());
        assert!(result.probabilities_by_category.is_empty());
    }
}
