//! Query catalog.
//!
//! The fixed, ordered set of statements the pipeline runs against the
//! warehouse. Table DDL and transform DML are static; the bulk-load
//! statements are assembled once from an [`EtlConfig`].

use serde::Serialize;

use crate::config::EtlConfig;
use crate::error::EtlResult;

/// Region of the source bucket.
pub const REGION: &str = "us-west-2";

/// Every table the pipeline owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Table {
    StagingEvents,
    StagingSongs,
    FactSongPlay,
    DimUsers,
    DimSongs,
    DimArtists,
    DimTime,
}

/// What a table is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableRole {
    Staging,
    Dimension,
    Fact,
}

impl std::fmt::Display for TableRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TableRole::Staging => "staging",
            TableRole::Dimension => "dimension",
            TableRole::Fact => "fact",
        };
        write!(f, "{}", s)
    }
}

/// Statement category, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatementKind {
    Drop,
    Create,
    Copy,
    Insert,
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatementKind::Drop => "DROP",
            StatementKind::Create => "CREATE",
            StatementKind::Copy => "COPY",
            StatementKind::Insert => "INSERT",
        };
        write!(f, "{}", s)
    }
}

impl Table {
    /// Drop and create order.
    pub const ALL: [Table; 7] = [
        Table::StagingEvents,
        Table::StagingSongs,
        Table::FactSongPlay,
        Table::DimUsers,
        Table::DimSongs,
        Table::DimArtists,
        Table::DimTime,
    ];

    /// Transform order. The fact table goes first; it only reads staging.
    pub const FINAL: [Table; 5] = [
        Table::FactSongPlay,
        Table::DimUsers,
        Table::DimSongs,
        Table::DimArtists,
        Table::DimTime,
    ];

    /// Table name as used in SQL.
    pub fn name(self) -> &'static str {
        match self {
            Table::StagingEvents => "stagingEvents",
            Table::StagingSongs => "stagingSongs",
            Table::FactSongPlay => "factSongPlay",
            Table::DimUsers => "dimUsers",
            Table::DimSongs => "dimSongs",
            Table::DimArtists => "dimArtists",
            Table::DimTime => "dimTime",
        }
    }

    pub fn role(self) -> TableRole {
        match self {
            Table::StagingEvents | Table::StagingSongs => TableRole::Staging,
            Table::FactSongPlay => TableRole::Fact,
            _ => TableRole::Dimension,
        }
    }

    pub fn drop_sql(self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.name())
    }

    pub fn create_sql(self) -> &'static str {
        match self {
            Table::StagingEvents => CREATE_STAGING_EVENTS,
            Table::StagingSongs => CREATE_STAGING_SONGS,
            Table::FactSongPlay => CREATE_FACT_SONGPLAY,
            Table::DimUsers => CREATE_DIM_USERS,
            Table::DimSongs => CREATE_DIM_SONGS,
            Table::DimArtists => CREATE_DIM_ARTISTS,
            Table::DimTime => CREATE_DIM_TIME,
        }
    }

    /// Transform that fills this table from staging. `None` for staging tables.
    pub fn insert_sql(self) -> Option<&'static str> {
        match self {
            Table::StagingEvents | Table::StagingSongs => None,
            Table::FactSongPlay => Some(INSERT_FACT_SONGPLAY),
            Table::DimUsers => Some(INSERT_DIM_USERS),
            Table::DimSongs => Some(INSERT_DIM_SONGS),
            Table::DimArtists => Some(INSERT_DIM_ARTISTS),
            Table::DimTime => Some(INSERT_DIM_TIME),
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: Table,
    pub sql: String,
}

impl Statement {
    fn new(kind: StatementKind, table: Table, sql: impl Into<String>) -> Self {
        Self {
            kind,
            table,
            sql: sql.into(),
        }
    }
}

/// The four ordered statement sequences.
#[derive(Debug, Clone)]
pub struct QueryCatalog {
    drops: Vec<Statement>,
    creates: Vec<Statement>,
    copies: Vec<Statement>,
    inserts: Vec<Statement>,
}

impl QueryCatalog {
    /// Build the catalog, embedding the configured S3 locations and role.
    pub fn new(config: &EtlConfig) -> EtlResult<Self> {
        config.validate()?;

        let drops = Table::ALL
            .iter()
            .map(|t| Statement::new(StatementKind::Drop, *t, t.drop_sql()))
            .collect();
        let creates = Table::ALL
            .iter()
            .map(|t| Statement::new(StatementKind::Create, *t, t.create_sql()))
            .collect();
        let inserts = Table::FINAL
            .iter()
            .filter_map(|t| {
                t.insert_sql()
                    .map(|sql| Statement::new(StatementKind::Insert, *t, sql))
            })
            .collect();

        let role = &config.iam_role.arn;
        let copies = vec![
            Statement::new(
                StatementKind::Copy,
                Table::StagingEvents,
                CopyStatement {
                    table: Table::StagingEvents,
                    source: &config.s3.log_data,
                    role,
                    epoch_millis: true,
                    json_spec: &config.s3.log_jsonpath,
                }
                .to_sql(),
            ),
            Statement::new(
                StatementKind::Copy,
                Table::StagingSongs,
                CopyStatement {
                    table: Table::StagingSongs,
                    source: &config.s3.song_data,
                    role,
                    epoch_millis: false,
                    json_spec: "auto",
                }
                .to_sql(),
            ),
        ];

        Ok(Self {
            drops,
            creates,
            copies,
            inserts,
        })
    }

    pub fn drops(&self) -> &[Statement] {
        &self.drops
    }

    pub fn creates(&self) -> &[Statement] {
        &self.creates
    }

    pub fn copies(&self) -> &[Statement] {
        &self.copies
    }

    pub fn inserts(&self) -> &[Statement] {
        &self.inserts
    }

    /// All sequences in execution order: drop, create, copy, insert.
    pub fn phases(&self) -> [(StatementKind, &[Statement]); 4] {
        [
            (StatementKind::Drop, self.drops.as_slice()),
            (StatementKind::Create, self.creates.as_slice()),
            (StatementKind::Copy, self.copies.as_slice()),
            (StatementKind::Insert, self.inserts.as_slice()),
        ]
    }
}

/// Redshift `COPY ... FORMAT AS JSON` from S3.
struct CopyStatement<'a> {
    table: Table,
    source: &'a str,
    role: &'a str,
    epoch_millis: bool,
    /// `auto` or the URI of a JSONPaths file.
    json_spec: &'a str,
}

impl CopyStatement<'_> {
    fn to_sql(&self) -> String {
        let mut sql = format!(
            "COPY {} FROM {} IAM_ROLE {} COMPUPDATE OFF REGION {}",
            self.table.name(),
            quote_literal(self.source),
            quote_literal(self.role),
            quote_literal(REGION),
        );
        if self.epoch_millis {
            sql.push_str(" TIMEFORMAT 'epochmillisecs'");
        }
        sql.push_str(" TRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL FORMAT AS JSON ");
        sql.push_str(&quote_literal(self.json_spec));
        sql.push(';');
        sql
    }
}

/// Quote a value as a SQL string literal.
///
/// COPY takes no bind parameters, so external values are embedded this way.
/// Backslashes and control characters are rejected by config validation.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

const CREATE_STAGING_EVENTS: &str = "\
CREATE TABLE IF NOT EXISTS stagingEvents (
    artist          VARCHAR,
    auth            VARCHAR,
    firstName       VARCHAR,
    gender          VARCHAR,
    itemInSession   INTEGER,
    lastName        VARCHAR,
    length          FLOAT,
    level           VARCHAR,
    location        VARCHAR,
    method          VARCHAR,
    page            VARCHAR,
    registration    BIGINT,
    sessionId       INTEGER,
    song            VARCHAR,
    status          INTEGER,
    ts              TIMESTAMP,
    userAgent       VARCHAR,
    userId          INTEGER
);";

const CREATE_STAGING_SONGS: &str = "\
CREATE TABLE IF NOT EXISTS stagingSongs (
    song_id             VARCHAR,
    num_songs           INTEGER,
    title               VARCHAR,
    artist_name         VARCHAR,
    artist_latitude     FLOAT,
    year                INTEGER,
    duration            FLOAT,
    artist_id           VARCHAR,
    artist_longitude    FLOAT,
    artist_location     VARCHAR
);";

const CREATE_FACT_SONGPLAY: &str = "\
CREATE TABLE IF NOT EXISTS factSongPlay (
    songplay_id     INTEGER IDENTITY(0,1) PRIMARY KEY,
    start_time      TIMESTAMP,
    user_id         INTEGER,
    level           VARCHAR,
    song_id         VARCHAR,
    artist_id       VARCHAR,
    session_id      INTEGER,
    location        VARCHAR,
    user_agent      VARCHAR
)
SORTKEY(songplay_id);";

const CREATE_DIM_USERS: &str = "\
CREATE TABLE IF NOT EXISTS dimUsers (
    user_id         INTEGER PRIMARY KEY,
    first_name      VARCHAR,
    last_name       VARCHAR,
    gender          VARCHAR,
    level           VARCHAR
)
DISTSTYLE AUTO;";

const CREATE_DIM_SONGS: &str = "\
CREATE TABLE IF NOT EXISTS dimSongs (
    song_id         VARCHAR PRIMARY KEY,
    title           VARCHAR,
    artist_id       VARCHAR DISTKEY,
    year            INTEGER,
    duration        FLOAT
);";

const CREATE_DIM_ARTISTS: &str = "\
CREATE TABLE IF NOT EXISTS dimArtists (
    artist_id       VARCHAR PRIMARY KEY,
    name            VARCHAR,
    location        VARCHAR,
    latitude        FLOAT,
    longitude       FLOAT
)
DISTSTYLE AUTO;";

const CREATE_DIM_TIME: &str = "\
CREATE TABLE IF NOT EXISTS dimTime (
    start_time      TIMESTAMP PRIMARY KEY SORTKEY,
    hour            INTEGER,
    day             INTEGER,
    week            INTEGER,
    month           INTEGER,
    year            INTEGER,
    weekday         INTEGER
)
DISTSTYLE AUTO;";

// Inner join: events without a matching (title, artist_name) produce no row.
const INSERT_FACT_SONGPLAY: &str = "\
INSERT INTO factSongPlay (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
SELECT DISTINCT
    se.ts           AS start_time,
    se.userId       AS user_id,
    se.level        AS level,
    ss.song_id      AS song_id,
    ss.artist_id    AS artist_id,
    se.sessionId    AS session_id,
    se.location     AS location,
    se.userAgent    AS user_agent
FROM stagingEvents se
JOIN stagingSongs ss
    ON se.song = ss.title
    AND se.artist = ss.artist_name;";

const INSERT_DIM_USERS: &str = "\
INSERT INTO dimUsers (user_id, first_name, last_name, gender, level)
SELECT DISTINCT
    userId          AS user_id,
    firstName       AS first_name,
    lastName        AS last_name,
    gender          AS gender,
    level           AS level
FROM stagingEvents
WHERE userId IS NOT NULL;";

const INSERT_DIM_SONGS: &str = "\
INSERT INTO dimSongs (song_id, title, artist_id, year, duration)
SELECT DISTINCT
    song_id         AS song_id,
    title           AS title,
    artist_id       AS artist_id,
    year            AS year,
    duration        AS duration
FROM stagingSongs
WHERE song_id IS NOT NULL;";

const INSERT_DIM_ARTISTS: &str = "\
INSERT INTO dimArtists (artist_id, name, location, latitude, longitude)
SELECT DISTINCT
    artist_id           AS artist_id,
    artist_name         AS name,
    artist_location     AS location,
    artist_latitude     AS latitude,
    artist_longitude    AS longitude
FROM stagingSongs
WHERE artist_id IS NOT NULL;";

// Redshift: WEEK is the ISO week, WEEKDAY (DOW) counts from Sunday = 0.
const INSERT_DIM_TIME: &str = "\
INSERT INTO dimTime (start_time, hour, day, week, month, year, weekday)
SELECT DISTINCT
    ts,
    EXTRACT(hour FROM ts),
    EXTRACT(day FROM ts),
    EXTRACT(week FROM ts),
    EXTRACT(month FROM ts),
    EXTRACT(year FROM ts),
    EXTRACT(weekday FROM ts)
FROM stagingEvents
WHERE ts IS NOT NULL;";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EtlConfig;
    use pretty_assertions::assert_eq;

    fn sample_config() -> EtlConfig {
        EtlConfig::from_toml_str(
            r#"
[cluster]
host = "localhost"
db_name = "dwh"
db_user = "dwhuser"
db_password = "pw"

[s3]
log_data = "s3://udacity-dend/log_data"
log_jsonpath = "s3://udacity-dend/log_json_path.json"
song_data = "s3://udacity-dend/song_data"

[iam_role]
arn = "arn:aws:iam::123456789012:role/dwhRole"
"#,
        )
        .unwrap()
    }

    fn tables(stmts: &[Statement]) -> Vec<&'static str> {
        stmts.iter().map(|s| s.table.name()).collect()
    }

    #[test]
    fn test_sequence_order() {
        let catalog = QueryCatalog::new(&sample_config()).unwrap();
        let all = vec![
            "stagingEvents",
            "stagingSongs",
            "factSongPlay",
            "dimUsers",
            "dimSongs",
            "dimArtists",
            "dimTime",
        ];
        assert_eq!(tables(catalog.drops()), all);
        assert_eq!(tables(catalog.creates()), all);
        assert_eq!(tables(catalog.copies()), vec!["stagingEvents", "stagingSongs"]);
        assert_eq!(
            tables(catalog.inserts()),
            vec!["factSongPlay", "dimUsers", "dimSongs", "dimArtists", "dimTime"]
        );
    }

    #[test]
    fn test_kinds_match_sequences() {
        let catalog = QueryCatalog::new(&sample_config()).unwrap();
        for (kind, stmts) in catalog.phases() {
            assert!(stmts.iter().all(|s| s.kind == kind));
        }
    }

    #[test]
    fn test_copy_events_shape() {
        let catalog = QueryCatalog::new(&sample_config()).unwrap();
        assert_eq!(
            catalog.copies()[0].sql,
            "COPY stagingEvents FROM 's3://udacity-dend/log_data' \
             IAM_ROLE 'arn:aws:iam::123456789012:role/dwhRole' \
             COMPUPDATE OFF REGION 'us-west-2' TIMEFORMAT 'epochmillisecs' \
             TRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL \
             FORMAT AS JSON 's3://udacity-dend/log_json_path.json';"
        );
    }

    #[test]
    fn test_copy_songs_shape() {
        let catalog = QueryCatalog::new(&sample_config()).unwrap();
        assert_eq!(
            catalog.copies()[1].sql,
            "COPY stagingSongs FROM 's3://udacity-dend/song_data' \
             IAM_ROLE 'arn:aws:iam::123456789012:role/dwhRole' \
             COMPUPDATE OFF REGION 'us-west-2' \
             TRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL \
             FORMAT AS JSON 'auto';"
        );
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("s3://b/it's"), "'s3://b/it''s'");
        assert_eq!(quote_literal("x'; DROP TABLE dimUsers; --"), "'x''; DROP TABLE dimUsers; --'");
    }

    #[test]
    fn test_quoted_source_stays_one_literal() {
        let mut config = sample_config();
        config.s3.song_data = "s3://bucket/a' IAM_ROLE 'x".into();
        let catalog = QueryCatalog::new(&config).unwrap();
        assert!(
            catalog.copies()[1]
                .sql
                .starts_with("COPY stagingSongs FROM 's3://bucket/a'' IAM_ROLE ''x' IAM_ROLE ")
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = sample_config();
        config.iam_role.arn = String::new();
        assert!(QueryCatalog::new(&config).is_err());
    }

    #[test]
    fn test_drop_and_create_are_idempotent_forms() {
        let catalog = QueryCatalog::new(&sample_config()).unwrap();
        assert!(catalog.drops().iter().all(|s| s.sql.starts_with("DROP TABLE IF EXISTS ")));
        assert!(
            catalog
                .creates()
                .iter()
                .all(|s| s.sql.starts_with("CREATE TABLE IF NOT EXISTS "))
        );
        assert_eq!(catalog.drops()[4].sql, "DROP TABLE IF EXISTS dimSongs;");
    }

    #[test]
    fn test_fact_insert_copies_timestamp_unchanged() {
        let sql = Table::FactSongPlay.insert_sql().unwrap();
        assert!(sql.contains("se.ts           AS start_time"));
        assert!(!sql.contains("to_char"));
        assert!(sql.contains("JOIN stagingSongs ss"));
        assert!(!sql.contains("LEFT JOIN"));
    }

    #[test]
    fn test_dimension_inserts_are_distinct_and_null_filtered() {
        for (table, key) in [
            (Table::DimUsers, "userId IS NOT NULL"),
            (Table::DimSongs, "song_id IS NOT NULL"),
            (Table::DimArtists, "artist_id IS NOT NULL"),
            (Table::DimTime, "ts IS NOT NULL"),
        ] {
            let sql = table.insert_sql().unwrap();
            assert!(sql.contains("SELECT DISTINCT"), "{}", table);
            assert!(sql.contains(key), "{}", table);
        }
    }

    #[test]
    fn test_staging_tables_have_no_insert() {
        assert_eq!(Table::StagingEvents.insert_sql(), None);
        assert_eq!(Table::StagingSongs.insert_sql(), None);
        assert_eq!(Table::StagingSongs.role(), TableRole::Staging);
        assert_eq!(Table::FactSongPlay.role(), TableRole::Fact);
        assert_eq!(Table::DimTime.role(), TableRole::Dimension);
    }

    #[test]
    fn test_copies_target_staging_and_inserts_target_final_tables() {
        let catalog = QueryCatalog::new(&sample_config()).unwrap();
        assert!(catalog.copies().iter().all(|s| s.table.role() == TableRole::Staging));
        assert!(catalog.inserts().iter().all(|s| s.table.role() != TableRole::Staging));
        assert_eq!(TableRole::Fact.to_string(), "fact");
        assert_eq!(Table::DimArtists.role().to_string(), "dimension");
    }
}
