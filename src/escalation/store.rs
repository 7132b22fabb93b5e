//! Persistent escalation store. Raise-or-absorb runs inside one IMMEDIATE
//! transaction so the open-alert check and the insert cannot interleave with
//! another writer; the partial unique index on open escalations backs it up.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use super::types::{RaiseOutcome, Trigger};
use crate::db::{self, DatabaseError};
use crate::error::EngineError;
use crate::models::{
    Escalation, EscalationObservation, EscalationStatus, Resolution, TriggerType,
};

/// Open a new escalation for the trigger, or fold it into the one already open.
/// An observation seen before is a no-op, even if its escalation was resolved since.
pub fn raise(
    conn: &Connection,
    trigger: &Trigger,
    observed_at: NaiveDateTime,
) -> Result<RaiseOutcome, EngineError> {
    let tx = db::immediate_transaction(conn)?;

    if db::observation_recorded(
        &tx,
        &trigger.patient_id,
        trigger.trigger_type,
        trigger.observed_on,
        &trigger.observation_key,
    )? {
        tracing::debug!(
            patient_id = %trigger.patient_id,
            trigger_type = %trigger.trigger_type,
            observed_on = %trigger.observed_on,
            key = %trigger.observation_key,
            "Observation already recorded, skipping"
        );
        return Ok(RaiseOutcome::AlreadyObserved);
    }

    let candidate = Escalation {
        id: Uuid::new_v4(),
        patient_id: trigger.patient_id,
        trigger_type: trigger.trigger_type,
        level: trigger.level,
        status: EscalationStatus::Open,
        detail: trigger.detail.clone(),
        created_at: observed_at,
        last_observed_at: observed_at,
        observation_count: 1,
        acknowledged_at: None,
        resolution_type: None,
        action_taken: None,
        resolution_note: None,
        resolved_at: None,
    };

    let opened = db::insert_escalation_if_none_open(&tx, &candidate)?;
    let escalation_id = if opened {
        candidate.id
    } else {
        let existing = db::get_open_escalation(&tx, &trigger.patient_id, trigger.trigger_type)?
            .ok_or_else(|| {
                EngineError::Conflict(format!(
                    "open {} escalation vanished during absorb",
                    trigger.trigger_type
                ))
            })?;
        db::absorb_observation(&tx, &existing.id, &trigger.detail, trigger.level, &observed_at)?;
        existing.id
    };

    db::insert_observation(
        &tx,
        &EscalationObservation {
            id: Uuid::new_v4(),
            escalation_id,
            patient_id: trigger.patient_id,
            trigger_type: trigger.trigger_type,
            observed_on: trigger.observed_on,
            observation_key: trigger.observation_key.clone(),
            detail: trigger.detail.clone(),
            observed_at,
        },
    )?;

    let escalation = db::get_escalation(&tx, &escalation_id)?
        .ok_or_else(|| EngineError::not_found("Escalation", escalation_id))?;
    tx.commit().map_err(DatabaseError::from)?;

    if opened {
        tracing::warn!(
            escalation_id = %escalation.id,
            patient_id = %escalation.patient_id,
            trigger_type = %escalation.trigger_type,
            level = escalation.level,
            "Escalation opened"
        );
        Ok(RaiseOutcome::Opened(escalation))
    } else {
        tracing::info!(
            escalation_id = %escalation.id,
            patient_id = %escalation.patient_id,
            trigger_type = %escalation.trigger_type,
            count = escalation.observation_count,
            "Observation absorbed into open escalation"
        );
        Ok(RaiseOutcome::Absorbed(escalation))
    }
}

/// Resolve the patient's unresolved escalations of the given types. When
/// `open_only` is set, acknowledged ones are left for the care team.
pub fn resolve_matching(
    conn: &Connection,
    patient_id: &Uuid,
    trigger_types: &[TriggerType],
    open_only: bool,
    resolution: &Resolution,
    at: NaiveDateTime,
) -> Result<Vec<Escalation>, EngineError> {
    let tx = db::immediate_transaction(conn)?;
    let mut resolved = Vec::new();
    for esc in db::list_patient_escalations(&tx, patient_id, true)? {
        if !trigger_types.contains(&esc.trigger_type) {
            continue;
        }
        if open_only && esc.status != EscalationStatus::Open {
            continue;
        }
        if db::mark_resolved(&tx, &esc.id, resolution, &at)? == 1 {
            if let Some(updated) = db::get_escalation(&tx, &esc.id)? {
                resolved.push(updated);
            }
        }
    }
    tx.commit().map_err(DatabaseError::from)?;

    for esc in &resolved {
        tracing::info!(
            escalation_id = %esc.id,
            %patient_id,
            trigger_type = %esc.trigger_type,
            resolution = %resolution.resolution_type,
            "Escalation resolved automatically"
        );
    }
    Ok(resolved)
}

/// open -> acknowledged. Acknowledging twice is a no-op; a resolved
/// escalation cannot be acknowledged.
pub fn acknowledge(
    conn: &Connection,
    id: &Uuid,
    at: NaiveDateTime,
) -> Result<Escalation, EngineError> {
    let tx = db::immediate_transaction(conn)?;
    let esc = db::get_escalation(&tx, id)?.ok_or_else(|| EngineError::not_found("Escalation", id))?;
    match esc.status {
        EscalationStatus::Acknowledged => return Ok(esc),
        EscalationStatus::Resolved => {
            return Err(EngineError::Conflict(format!("escalation {id} is already resolved")))
        }
        EscalationStatus::Open => {}
    }
    if db::mark_acknowledged(&tx, id, &at)? != 1 {
        return Err(EngineError::Conflict(format!("escalation {id} changed status")));
    }
    let updated = db::get_escalation(&tx, id)?.ok_or_else(|| EngineError::not_found("Escalation", id))?;
    tx.commit().map_err(DatabaseError::from)?;
    tracing::info!(escalation_id = %id, patient_id = %updated.patient_id, "Escalation acknowledged");
    Ok(updated)
}

/// open | acknowledged -> resolved. Resolved is terminal.
pub fn resolve(
    conn: &Connection,
    id: &Uuid,
    resolution: &Resolution,
    at: NaiveDateTime,
) -> Result<Escalation, EngineError> {
    let tx = db::immediate_transaction(conn)?;
    let esc = db::get_escalation(&tx, id)?.ok_or_else(|| EngineError::not_found("Escalation", id))?;
    if esc.status.is_terminal() || db::mark_resolved(&tx, id, resolution, &at)? != 1 {
        return Err(EngineError::Conflict(format!("escalation {id} is already resolved")));
    }
    let updated = db::get_escalation(&tx, id)?.ok_or_else(|| EngineError::not_found("Escalation", id))?;
    tx.commit().map_err(DatabaseError::from)?;
    tracing::info!(
        escalation_id = %id,
        patient_id = %updated.patient_id,
        resolution = %resolution.resolution_type,
        "Escalation resolved"
    );
    Ok(updated)
}
