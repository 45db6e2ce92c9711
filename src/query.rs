//! Query input for a single run

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of statement being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    Select,
    Insert,
    Upsert,
    CreateTableAs,
    Compute,
}

impl QueryType {
    /// SELECT results are streamed and digested; everything else is awaited
    pub fn is_select(&self) -> bool {
        matches!(self, QueryType::Select)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Upsert => "UPSERT",
            QueryType::CreateTableAs => "CREATE_TABLE_AS",
            QueryType::Compute => "COMPUTE",
        };
        f.write_str(name)
    }
}

/// A query to run, immutable for the duration of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Identifier used to name artifacts, e.g. `tpcds_q21`
    pub logical_query_id: String,
    pub sql: String,
    pub query_type: QueryType,
    #[serde(default)]
    pub db_name: Option<String>,
    /// Executed before `sql` when the caller asks for set-up
    #[serde(default)]
    pub set_up_sql: Option<String>,
    /// Engine options applied after the runner's common options
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Digest from a baseline run, if one exists
    #[serde(default)]
    pub result_hash: Option<u64>,
}

impl Query {
    pub fn new(logical_query_id: impl Into<String>, sql: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            logical_query_id: logical_query_id.into(),
            sql: sql.into(),
            query_type,
            db_name: None,
            set_up_sql: None,
            options: BTreeMap::new(),
            result_hash: None,
        }
    }

    pub fn with_db(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }

    pub fn with_set_up(mut self, set_up_sql: impl Into<String>) -> Self {
        self.set_up_sql = Some(set_up_sql.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn with_result_hash(mut self, result_hash: u64) -> Self {
        self.result_hash = Some(result_hash);
        self
    }
}
