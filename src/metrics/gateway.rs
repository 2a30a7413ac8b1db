use chrono::NaiveDate;
use duckdb::{params, params_from_iter, Connection};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::{self, DbError, DbPool};
use crate::metrics::models::{
    ChartMetric, ChartValue, DateRange, FilterClause, FilterMetric, FilterValue, SelectedFilters,
};

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error(transparent)]
    Database(#[from] DbError),
}

/// Read side of the dashboard: facet values and aggregate charts over the
/// processed call data.
#[derive(Clone)]
pub struct MetricsGateway {
    pool: DbPool,
    // The shift is read then applied; two overlapping runs would apply it twice.
    normalize_lock: Arc<Mutex<()>>,
}

impl MetricsGateway {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            normalize_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Shifts every call so the most recent `StartTime` falls on `today`.
    ///
    /// The shift is a whole number of days applied to both `StartTime` and
    /// `EndTime`, so durations and gaps between calls are unchanged. Returns
    /// the number of days applied.
    pub async fn normalize_dates(&self, today: NaiveDate) -> Result<i64, DbError> {
        let _guard = self.normalize_lock.lock().await;
        db::with_connection(&self.pool, move |conn| normalize_dates(conn, today)).await
    }

    pub async fn fetch_filter_metrics(&self) -> Result<Vec<FilterMetric>, DbError> {
        db::with_connection(&self.pool, |conn| filter_metrics(conn)).await
    }

    /// Aggregates for the dashboard charts. `None` and an empty selection
    /// both mean "all calls".
    pub async fn fetch_chart_metrics(
        &self,
        filters: Option<&SelectedFilters>,
        today: NaiveDate,
    ) -> Result<Vec<ChartMetric>, MetricsError> {
        let clause = match filters {
            Some(filters) if !filters.is_empty() => filters
                .to_clause(today)
                .map_err(MetricsError::InvalidFilter)?,
            _ => FilterClause::default(),
        };
        debug!(clause = %clause.sql, params = clause.params.len(), "Fetching chart metrics");

        let charts = db::with_connection(&self.pool, move |conn| chart_metrics(conn, &clause)).await?;
        Ok(charts)
    }
}

fn normalize_dates(conn: &Connection, today: NaiveDate) -> Result<i64, DbError> {
    let shift: Option<i64> = conn.query_row(
        "SELECT date_diff('day', CAST(MAX(StartTime) AS DATE), CAST(? AS DATE)) FROM km_processed_data",
        params![today.to_string()],
        |row| row.get(0),
    )?;

    let Some(days) = shift.filter(|days| *days != 0) else {
        return Ok(0);
    };

    let updated = conn.execute(
        "UPDATE km_processed_data
         SET StartTime = StartTime + to_days(CAST(? AS INTEGER)),
             EndTime = EndTime + to_days(CAST(? AS INTEGER))",
        params![days, days],
    )?;
    info!(days, rows = updated, "Shifted call dates to end today");

    Ok(days)
}

fn filter_metrics(conn: &Connection) -> Result<Vec<FilterMetric>, DbError> {
    let topics = distinct_values(conn, "topic")?;
    let sentiments = distinct_values(conn, "sentiment")?;

    Ok(vec![
        FilterMetric {
            filter_name: "Topic",
            filter_values: topics.into_iter().map(FilterValue::same).collect(),
        },
        FilterMetric {
            filter_name: "Sentiment",
            filter_values: sentiments.into_iter().map(FilterValue::same).collect(),
        },
        FilterMetric {
            filter_name: "DateRange",
            filter_values: DateRange::ALL
                .into_iter()
                .map(|range| FilterValue::same(range.label()))
                .collect(),
        },
    ])
}

// `column` is always one of our own literals, never caller input.
fn distinct_values(conn: &Connection, column: &str) -> Result<Vec<String>, DbError> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM km_processed_data WHERE {col} IS NOT NULL ORDER BY {col}",
        col = column
    );
    let mut stmt = conn.prepare(&sql)?;
    let values = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values)
}

fn chart_metrics(conn: &Connection, clause: &FilterClause) -> Result<Vec<ChartMetric>, DbError> {
    let from = format!("FROM km_processed_data{}", clause.sql);

    let total_calls: i64 = scalar(conn, &format!("SELECT COUNT(*) {from}"), clause)?;
    let avg_handling: f64 = scalar(
        conn,
        &format!(
            "SELECT CAST(COALESCE(ROUND(AVG(date_diff('second', StartTime, EndTime)) / 60.0, 2), 0) AS DOUBLE) {from}"
        ),
        clause,
    )?;
    let satisfied: f64 = scalar(
        conn,
        &format!(
            "SELECT CAST(COALESCE(ROUND(100.0 * SUM(CASE WHEN lower(satisfied) = 'yes' THEN 1 ELSE 0 END) / NULLIF(COUNT(*), 0), 2), 0) AS DOUBLE) {from}"
        ),
        clause,
    )?;

    let sentiment = grouped(
        conn,
        &format!(
            "SELECT COALESCE(sentiment, 'unknown') AS label, CAST(COUNT(*) AS DOUBLE) {from}
             GROUP BY label ORDER BY COUNT(*) DESC, label"
        ),
        clause,
        |row| {
            Ok(ChartValue::Count {
                name: row.get(0)?,
                value: row.get(1)?,
            })
        },
    )?;

    let handling_by_topic = grouped(
        conn,
        &format!(
            "SELECT COALESCE(topic, 'unknown') AS label,
                    CAST(COALESCE(ROUND(AVG(date_diff('second', StartTime, EndTime)) / 60.0, 2), 0) AS DOUBLE) {from}
             GROUP BY label ORDER BY label"
        ),
        clause,
        |row| {
            Ok(ChartValue::Count {
                name: row.get(0)?,
                value: row.get(1)?,
            })
        },
    )?;

    let topics = grouped(
        conn,
        &format!(
            "SELECT COALESCE(topic, 'unknown') AS label, COUNT(*), COALESCE(mode(sentiment), 'unknown') {from}
             GROUP BY label ORDER BY COUNT(*) DESC, label"
        ),
        clause,
        |row| {
            Ok(ChartValue::Topic {
                name: row.get(0)?,
                call_frequency: row.get(1)?,
                average_sentiment: row.get(2)?,
            })
        },
    )?;

    let key_phrases = grouped(
        conn,
        &format!(
            "SELECT key_phrase, COUNT(*), COALESCE(mode(sentiment), 'unknown')
             FROM processed_data_key_phrases
             WHERE key_phrase IS NOT NULL
               AND ConversationId IN (SELECT ConversationId {from})
             GROUP BY key_phrase ORDER BY COUNT(*) DESC, key_phrase
             LIMIT 50"
        ),
        clause,
        |row| {
            Ok(ChartValue::Phrase {
                text: row.get(0)?,
                size: row.get(1)?,
                average_sentiment: row.get(2)?,
            })
        },
    )?;

    Ok(vec![
        ChartMetric {
            id: "TOTAL_CALLS",
            chart_name: "Total Calls",
            chart_type: "card",
            chart_value: vec![ChartValue::Card {
                name: "Total Calls".to_string(),
                value: total_calls as f64,
                unit_of_measurement: "",
            }],
        },
        ChartMetric {
            id: "AVG_HANDLING_TIME",
            chart_name: "Average Handling Time",
            chart_type: "card",
            chart_value: vec![ChartValue::Card {
                name: "Average Handling Time".to_string(),
                value: avg_handling,
                unit_of_measurement: "mins",
            }],
        },
        ChartMetric {
            id: "SATISFIED",
            chart_name: "Satisfied",
            chart_type: "card",
            chart_value: vec![ChartValue::Card {
                name: "Satisfied".to_string(),
                value: satisfied,
                unit_of_measurement: "%",
            }],
        },
        ChartMetric {
            id: "SENTIMENT",
            chart_name: "Topics Overview",
            chart_type: "donutchart",
            chart_value: sentiment,
        },
        ChartMetric {
            id: "AVG_HANDLING_TIME_BY_TOPIC",
            chart_name: "Average Handling Time By Topic",
            chart_type: "bar",
            chart_value: handling_by_topic,
        },
        ChartMetric {
            id: "TOPICS",
            chart_name: "Trending Topics",
            chart_type: "table",
            chart_value: topics,
        },
        ChartMetric {
            id: "KEY_PHRASES",
            chart_name: "Key Phrases",
            chart_type: "wordcloud",
            chart_value: key_phrases,
        },
    ])
}

fn scalar<T: duckdb::types::FromSql>(
    conn: &Connection,
    sql: &str,
    clause: &FilterClause,
) -> Result<T, DbError> {
    let value = conn.query_row(sql, params_from_iter(clause.params.iter()), |row| row.get(0))?;
    Ok(value)
}

fn grouped<F>(
    conn: &Connection,
    sql: &str,
    clause: &FilterClause,
    map: F,
) -> Result<Vec<ChartValue>, DbError>
where
    F: FnMut(&duckdb::Row<'_>) -> duckdb::Result<ChartValue>,
{
    let mut stmt = conn.prepare(sql)?;
    let values = stmt
        .query_map(params_from_iter(clause.params.iter()), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_pool, seed_calls};
    use chrono::NaiveDateTime;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn start_times(pool: &DbPool) -> Vec<NaiveDateTime> {
        let conn = pool.get().unwrap();
        let mut stmt = conn
            .prepare("SELECT CAST(StartTime AS VARCHAR) FROM km_processed_data ORDER BY ConversationId")
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(|s| NaiveDateTime::parse_from_str(&s.unwrap(), "%Y-%m-%d %H:%M:%S").unwrap())
            .collect()
    }

    fn card_value(charts: &[ChartMetric], id: &str) -> f64 {
        let chart = charts.iter().find(|c| c.id == id).unwrap();
        match &chart.chart_value[0] {
            ChartValue::Card { value, .. } => *value,
            other => panic!("{id} is not a card: {other:?}"),
        }
    }

    #[tokio::test]
    async fn normalization_moves_latest_call_to_today_and_keeps_offsets() {
        let pool = memory_pool();
        seed_calls(&pool);
        let gateway = MetricsGateway::new(pool.clone());
        let before = start_times(&pool);
        let today = day(2025, 6, 20);

        let shift = gateway.normalize_dates(today).await.unwrap();

        let after = start_times(&pool);
        assert_ne!(shift, 0);
        assert_eq!(after.iter().max().unwrap().date(), today);
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(*a - *b, chrono::Duration::days(shift));
        }
        for pair in before.windows(2).zip(after.windows(2)) {
            assert_eq!(pair.0[1] - pair.0[0], pair.1[1] - pair.1[0]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_normalizations_shift_only_once() {
        let pool = memory_pool();
        seed_calls(&pool);
        let gateway = MetricsGateway::new(pool.clone());
        let other = gateway.clone();
        let today = day(2025, 6, 20);

        let (a, b) = tokio::join!(
            gateway.normalize_dates(today),
            other.normalize_dates(today)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.min(b), 0);
        assert_ne!(a.max(b), 0);
        assert_eq!(start_times(&pool).iter().max().unwrap().date(), today);
    }

    #[tokio::test]
    async fn normalization_is_idempotent() {
        let pool = memory_pool();
        seed_calls(&pool);
        let gateway = MetricsGateway::new(pool);
        let today = day(2025, 6, 20);

        gateway.normalize_dates(today).await.unwrap();
        assert_eq!(gateway.normalize_dates(today).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn normalization_of_empty_table_is_a_no_op() {
        let gateway = MetricsGateway::new(memory_pool());
        assert_eq!(gateway.normalize_dates(day(2025, 6, 20)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn filter_metrics_list_each_facet() {
        let pool = memory_pool();
        seed_calls(&pool);
        let gateway = MetricsGateway::new(pool);

        let facets = gateway.fetch_filter_metrics().await.unwrap();

        let names: Vec<_> = facets.iter().map(|f| f.filter_name).collect();
        assert_eq!(names, vec!["Topic", "Sentiment", "DateRange"]);
        let topics: Vec<_> = facets[0].filter_values.iter().map(|v| v.key.as_str()).collect();
        assert_eq!(topics, vec!["Billing", "Internet Outage"]);
        let sentiments: Vec<_> = facets[1].filter_values.iter().map(|v| v.key.as_str()).collect();
        assert_eq!(sentiments, vec!["negative", "neutral", "positive"]);
        assert_eq!(facets[2].filter_values.len(), 4);
    }

    #[tokio::test]
    async fn chart_metrics_aggregate_all_calls() {
        let pool = memory_pool();
        seed_calls(&pool);
        let gateway = MetricsGateway::new(pool);

        let charts = gateway.fetch_chart_metrics(None, day(2025, 6, 20)).await.unwrap();

        let ids: Vec<_> = charts.iter().map(|c| c.id).collect();
        assert_eq!(
            ids,
            vec![
                "TOTAL_CALLS",
                "AVG_HANDLING_TIME",
                "SATISFIED",
                "SENTIMENT",
                "AVG_HANDLING_TIME_BY_TOPIC",
                "TOPICS",
                "KEY_PHRASES"
            ]
        );
        assert_eq!(card_value(&charts, "TOTAL_CALLS"), 4.0);
        // 10 + 20 + 6 + 4 minutes over four calls
        assert_eq!(card_value(&charts, "AVG_HANDLING_TIME"), 10.0);
        assert_eq!(card_value(&charts, "SATISFIED"), 50.0);

        let topics = charts.iter().find(|c| c.id == "TOPICS").unwrap();
        assert_eq!(
            topics.chart_value[0],
            ChartValue::Topic {
                name: "Billing".to_string(),
                call_frequency: 3,
                average_sentiment: "negative".to_string(),
            }
        );

        let phrases = charts.iter().find(|c| c.id == "KEY_PHRASES").unwrap();
        assert_eq!(
            phrases.chart_value[0],
            ChartValue::Phrase {
                text: "late fee".to_string(),
                size: 2,
                average_sentiment: "negative".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn empty_selection_matches_unfiltered_charts() {
        let pool = memory_pool();
        seed_calls(&pool);
        let gateway = MetricsGateway::new(pool);
        let today = day(2025, 6, 20);

        let unfiltered = gateway.fetch_chart_metrics(None, today).await.unwrap();
        let empty = gateway
            .fetch_chart_metrics(Some(&SelectedFilters::default()), today)
            .await
            .unwrap();

        assert_eq!(unfiltered, empty);
    }

    #[tokio::test]
    async fn topic_and_date_filters_narrow_the_charts() {
        let pool = memory_pool();
        seed_calls(&pool);
        let gateway = MetricsGateway::new(pool);
        let today = day(2025, 6, 20);
        gateway.normalize_dates(today).await.unwrap();

        let billing = SelectedFilters {
            topic: vec!["Billing".to_string()],
            ..SelectedFilters::default()
        };
        let charts = gateway.fetch_chart_metrics(Some(&billing), today).await.unwrap();
        assert_eq!(card_value(&charts, "TOTAL_CALLS"), 3.0);

        let last_week = SelectedFilters {
            date_range: vec!["Last 7 days".to_string()],
            ..SelectedFilters::default()
        };
        let charts = gateway.fetch_chart_metrics(Some(&last_week), today).await.unwrap();
        assert_eq!(card_value(&charts, "TOTAL_CALLS"), 2.0);
    }

    #[tokio::test]
    async fn unknown_date_range_is_an_invalid_filter() {
        let gateway = MetricsGateway::new(memory_pool());
        let filters = SelectedFilters {
            date_range: vec!["Since forever".to_string()],
            ..SelectedFilters::default()
        };

        let err = gateway
            .fetch_chart_metrics(Some(&filters), day(2025, 6, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidFilter(_)));
    }
}
