use rusqlite::{params, Connection, Row};

use crate::db::DatabaseError;
use crate::models::dynamic_step::{RetryPolicyName, StopCondition};
use crate::models::DynamicStep;

pub fn list_enabled(conn: &Connection) -> Result<Vec<DynamicStep>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM dynamic_steps WHERE enabled = 1 ORDER BY step_order")?;
    let rows = stmt.query_map([], row_to_step)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_all(conn: &Connection) -> Result<Vec<DynamicStep>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM dynamic_steps ORDER BY step_order")?;
    let rows = stmt.query_map([], row_to_step)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<DynamicStep>, DatabaseError> {
    let result = conn.query_row("SELECT * FROM dynamic_steps WHERE id = ?1", params![id], row_to_step);
    match result {
        Ok(step) => Ok(Some(step)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub struct NewDynamicStep {
    pub name: String,
    pub order: i32,
    pub enabled: bool,
    pub prompt_template: String,
    pub model_id: i64,
    pub temperature: f64,
    pub max_tokens: i32,
    pub retry_on_failure: bool,
    pub max_retries: i32,
    pub retry_policy: RetryPolicyName,
    pub input_from_previous_step: bool,
    pub output_format: Option<String>,
    pub document_class_id: Option<i64>,
    pub is_branching_step: bool,
    pub branching_field: Option<String>,
    pub post_branching: bool,
    pub required_context_variables: Vec<String>,
    pub stop_conditions: Vec<StopCondition>,
}

fn retry_policy_str(policy: RetryPolicyName) -> &'static str {
    match policy {
        RetryPolicyName::Default => "default",
        RetryPolicyName::Aggressive => "aggressive",
        RetryPolicyName::Conservative => "conservative",
        RetryPolicyName::Api => "api",
        RetryPolicyName::Database => "database",
    }
}

/// At most one step in the whole pipeline may have `is_branching_step = true`.
/// `exclude_id` lets `update` check against every *other* row.
fn rejects_second_branching_step(conn: &Connection, new: &NewDynamicStep, exclude_id: Option<i64>) -> Result<bool, DatabaseError> {
    if !new.is_branching_step {
        return Ok(false);
    }
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM dynamic_steps WHERE is_branching_step = 1 AND id != ?1",
        params![exclude_id.unwrap_or(-1)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert(conn: &Connection, new: &NewDynamicStep) -> Result<DynamicStep, DatabaseError> {
    if rejects_second_branching_step(conn, new, None)? {
        return Err(DatabaseError::ConstraintViolation(
            "another step is already marked is_branching_step; at most one branching step is allowed".into(),
        ));
    }
    conn.execute(
        "INSERT INTO dynamic_steps (name, step_order, enabled, prompt_template, model_id, temperature, max_tokens,
         retry_on_failure, max_retries, retry_policy, input_from_previous_step, output_format, document_class_id,
         is_branching_step, branching_field, post_branching, required_context_variables, stop_conditions)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
        params![
            new.name,
            new.order,
            new.enabled,
            new.prompt_template,
            new.model_id,
            new.temperature,
            new.max_tokens,
            new.retry_on_failure,
            new.max_retries,
            retry_policy_str(new.retry_policy),
            new.input_from_previous_step,
            new.output_format,
            new.document_class_id,
            new.is_branching_step,
            new.branching_field,
            new.post_branching,
            serde_json::to_string(&new.required_context_variables).unwrap(),
            serde_json::to_string(&new.stop_conditions).unwrap(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| DatabaseError::NotFound { entity_type: "DynamicStep".into(), id: id.to_string() })
}

pub fn update(conn: &Connection, id: i64, new: &NewDynamicStep) -> Result<DynamicStep, DatabaseError> {
    if rejects_second_branching_step(conn, new, Some(id))? {
        return Err(DatabaseError::ConstraintViolation(
            "another step is already marked is_branching_step; at most one branching step is allowed".into(),
        ));
    }
    conn.execute(
        "UPDATE dynamic_steps SET name = ?1, step_order = ?2, enabled = ?3, prompt_template = ?4, model_id = ?5,
         temperature = ?6, max_tokens = ?7, retry_on_failure = ?8, max_retries = ?9, retry_policy = ?10,
         input_from_previous_step = ?11, output_format = ?12, document_class_id = ?13, is_branching_step = ?14,
         branching_field = ?15, post_branching = ?16, required_context_variables = ?17, stop_conditions = ?18
         WHERE id = ?19",
        params![
            new.name,
            new.order,
            new.enabled,
            new.prompt_template,
            new.model_id,
            new.temperature,
            new.max_tokens,
            new.retry_on_failure,
            new.max_retries,
            retry_policy_str(new.retry_policy),
            new.input_from_previous_step,
            new.output_format,
            new.document_class_id,
            new.is_branching_step,
            new.branching_field,
            new.post_branching,
            serde_json::to_string(&new.required_context_variables).unwrap(),
            serde_json::to_string(&new.stop_conditions).unwrap(),
            id,
        ],
    )?;
    get(conn, id)?.ok_or_else(|| DatabaseError::NotFound { entity_type: "DynamicStep".into(), id: id.to_string() })
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM dynamic_steps WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

fn row_to_step(row: &Row) -> rusqlite::Result<DynamicStep> {
    let bad = || rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "malformed json".into());
    let retry_policy_str: String = row.get("retry_policy")?;
    let required_vars_str: String = row.get("required_context_variables")?;
    let stop_conditions_str: String = row.get("stop_conditions")?;

    Ok(DynamicStep {
        id: row.get("id")?,
        name: row.get("name")?,
        order: row.get("step_order")?,
        enabled: row.get("enabled")?,
        prompt_template: row.get("prompt_template")?,
        model_id: row.get("model_id")?,
        temperature: row.get("temperature")?,
        max_tokens: row.get("max_tokens")?,
        retry_on_failure: row.get("retry_on_failure")?,
        max_retries: row.get("max_retries")?,
        retry_policy: parse_retry_policy(&retry_policy_str),
        input_from_previous_step: row.get("input_from_previous_step")?,
        output_format: row.get("output_format")?,
        document_class_id: row.get("document_class_id")?,
        is_branching_step: row.get("is_branching_step")?,
        branching_field: row.get("branching_field")?,
        post_branching: row.get("post_branching")?,
        required_context_variables: serde_json::from_str::<Vec<String>>(&required_vars_str).map_err(|_| bad())?,
        stop_conditions: serde_json::from_str::<Vec<StopCondition>>(&stop_conditions_str).map_err(|_| bad())?,
    })
}

fn parse_retry_policy(s: &str) -> RetryPolicyName {
    match s {
        "aggressive" => RetryPolicyName::Aggressive,
        "conservative" => RetryPolicyName::Conservative,
        "api" => RetryPolicyName::Api,
        "database" => RetryPolicyName::Database,
        _ => RetryPolicyName::Default,
    }
}
