use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::db_utils::placeholders;

/// Which family of metrics `GET /get_metrics` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Filters,
    Charts,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Filters => "filters",
            DataType::Charts => "charts",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filters" => Ok(DataType::Filters),
            "charts" => Ok(DataType::Charts),
            other => Err(format!("unknown data type `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    Last7Days,
    Last14Days,
    Last30Days,
    YearToDate,
}

impl DateRange {
    pub const ALL: [DateRange; 4] = [
        DateRange::Last7Days,
        DateRange::Last14Days,
        DateRange::Last30Days,
        DateRange::YearToDate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DateRange::Last7Days => "Last 7 days",
            DateRange::Last14Days => "Last 14 days",
            DateRange::Last30Days => "Last 30 days",
            DateRange::YearToDate => "Year to Date",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|range| range.label().eq_ignore_ascii_case(label))
    }

    /// First day included by the range, relative to `today`.
    pub fn start(self, today: NaiveDate) -> NaiveDate {
        let back = |days| today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        match self {
            DateRange::Last7Days => back(7),
            DateRange::Last14Days => back(14),
            DateRange::Last30Days => back(30),
            DateRange::YearToDate => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        }
    }
}

/// Facet selections posted by the dashboard. An empty list leaves that facet
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SelectedFilters {
    #[serde(rename = "Topic", default)]
    pub topic: Vec<String>,
    #[serde(rename = "Sentiment", default)]
    pub sentiment: Vec<String>,
    #[serde(rename = "DateRange", default)]
    pub date_range: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartFilters {
    pub selected_filters: SelectedFilters,
}

/// A `WHERE` clause over `km_processed_data` plus its bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterClause {
    pub sql: String,
    pub params: Vec<String>,
}

impl SelectedFilters {
    pub fn is_empty(&self) -> bool {
        self.topic.is_empty() && self.sentiment.is_empty() && self.date_range.is_empty()
    }

    /// Only the first selected date range applies.
    pub fn date_range(&self) -> Result<Option<DateRange>, String> {
        match self.date_range.first() {
            None => Ok(None),
            Some(label) => DateRange::from_label(label)
                .map(Some)
                .ok_or_else(|| format!("unknown date range `{}`", label)),
        }
    }

    pub fn to_clause(&self, today: NaiveDate) -> Result<FilterClause, String> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if !self.topic.is_empty() {
            conditions.push(format!("topic IN ({})", placeholders(self.topic.len())));
            params.extend(self.topic.iter().cloned());
        }
        if !self.sentiment.is_empty() {
            conditions.push(format!(
                "sentiment IN ({})",
                placeholders(self.sentiment.len())
            ));
            params.extend(self.sentiment.iter().cloned());
        }
        if let Some(range) = self.date_range()? {
            conditions.push("StartTime >= CAST(? AS TIMESTAMP)".to_string());
            params.push(range.start(today).to_string());
        }

        if conditions.is_empty() {
            return Ok(FilterClause::default());
        }

        Ok(FilterClause {
            sql: format!(" WHERE {}", conditions.join(" AND ")),
            params,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterValue {
    pub key: String,
    #[serde(rename = "displayValue")]
    pub display_value: String,
}

impl FilterValue {
    pub fn same(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            key: value.clone(),
            display_value: value,
        }
    }
}

/// One facet of the dashboard filter controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterMetric {
    pub filter_name: &'static str,
    pub filter_values: Vec<FilterValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartValue {
    Card {
        name: String,
        value: f64,
        unit_of_measurement: &'static str,
    },
    Count {
        name: String,
        value: f64,
    },
    Topic {
        name: String,
        call_frequency: i64,
        average_sentiment: String,
    },
    Phrase {
        text: String,
        size: i64,
        average_sentiment: String,
    },
}

/// One dashboard visualization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartMetric {
    pub id: &'static str,
    pub chart_name: &'static str,
    pub chart_type: &'static str,
    pub chart_value: Vec<ChartValue>,
}
