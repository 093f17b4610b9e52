//! `DEDUPE_RECONCILE` and `DETECT_FAMILY_OVERLAP` handlers (spec.md §4.7/§4.8):
//! post-download cryptographic dedupe and cross-design family detection.
//! Both run over data the Catalog Store hands back as plain tuples; the
//! actual matching logic lives in `printarr_core::dedupe`/`family` and is
//! never touched here beyond wiring it to persisted rows.

use tracing::info;

use printarr_core::dedupe;
use printarr_core::domain::{FamilyDetectionMethod, DesignFamily, Job, MatchType};
use printarr_core::error::PrintarrError;
use printarr_core::family;

use super::{HandlerResult, JobContext};

pub async fn run_dedupe_reconcile(ctx: &JobContext, job: &Job) -> HandlerResult {
    let design_id = job
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "design_id".into(), message: "dedupe job missing design_id".into() })?;

    let own_files = ctx.store.list_design_files(design_id)?;
    let own_hashes: Vec<String> = own_files.iter().filter_map(|f| f.sha256.clone()).collect();
    if own_hashes.is_empty() {
        return Ok(Some(serde_json::json!({ "candidates_raised": 0 })));
    }

    let all_hashes = ctx.store.list_all_file_hashes()?;
    let candidates = dedupe::find_hash_candidates(design_id, &own_hashes, &all_hashes);

    let mut raised = 0;
    for candidate in &candidates {
        if !ctx.store.has_pending_candidate(design_id, &candidate.other_design_id, MatchType::Hash)? {
            ctx.store.insert_duplicate_candidate(design_id, &candidate.other_design_id, MatchType::Hash)?;
            raised += 1;
        }
    }

    info!(design_id, candidates_raised = raised, "post-download dedupe reconcile complete");
    Ok(Some(serde_json::json!({ "candidates_raised": raised })))
}

pub async fn run_detect_family_overlap(ctx: &JobContext, job: &Job) -> HandlerResult {
    let design_id = job
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "design_id".into(), message: "family overlap job missing design_id".into() })?;

    let own_files = ctx.store.list_design_files(design_id)?;
    let own_hashes: std::collections::HashSet<String> = own_files.iter().filter_map(|f| f.sha256.clone()).collect();

    let all_sets = ctx.store.list_design_hash_sets_with_family()?;
    let others: Vec<_> = all_sets.into_iter().filter(|(id, _, _)| id != design_id).collect();

    if !own_hashes.is_empty() {
        let overlap_candidates = family::find_overlap_candidates(&own_hashes, &others);
        match family::resolve_overlap_candidates(design_id, &overlap_candidates) {
            family::FamilyDecision::Join { family_id, .. } => {
                ctx.store.assign_design_to_family(design_id, &family_id, None)?;
                info!(design_id, family_id, "design joined existing family by file hash overlap");
                return Ok(Some(serde_json::json!({ "joined_family": family_id })));
            }
            family::FamilyDecision::Create { member_design_ids, confidence, method } => {
                let family_id = printarr_core::domain::new_id();
                let family_row = DesignFamily {
                    id: family_id.clone(),
                    name: String::new(),
                    detection_method: method,
                    detection_confidence: confidence,
                    created_at: chrono::Utc::now(),
                };
                ctx.store.insert_family(&family_row)?;
                for member_id in &member_design_ids {
                    ctx.store.assign_design_to_family(member_id, &family_id, None)?;
                }
                info!(design_id, family_id, confidence, "new family created by file hash overlap");
                return Ok(Some(serde_json::json!({ "created_family": family_id, "confidence": confidence })));
            }
            family::FamilyDecision::NoCandidate => {}
        }
    }

    // Fallback: name-pattern decomposition, only tried when hash overlap
    // found nothing.
    let design = ctx
        .store
        .get_design(design_id)?
        .ok_or_else(|| PrintarrError::NotFound { resource: "design".into(), id: design_id.clone() })?;
    let titles = ctx.store.list_designs_title_designer()?;
    let other_titles: Vec<(String, String)> = titles
        .into_iter()
        .filter(|(id, _, _)| id != design_id)
        .map(|(id, title, _)| (id, title))
        .collect();
    let name_matches = family::find_name_pattern_candidates(&design.canonical_title, &other_titles);

    if name_matches.is_empty() {
        info!(design_id, "no family overlap candidates found");
        return Ok(Some(serde_json::json!({ "joined_family": Option::<String>::None })));
    }

    let family_id = printarr_core::domain::new_id();
    let family_row = DesignFamily {
        id: family_id.clone(),
        name: String::new(),
        detection_method: FamilyDetectionMethod::NamePattern,
        detection_confidence: 0.5,
        created_at: chrono::Utc::now(),
    };
    ctx.store.insert_family(&family_row)?;
    ctx.store.assign_design_to_family(design_id, &family_id, None)?;
    for member_id in &name_matches {
        ctx.store.assign_design_to_family(member_id, &family_id, None)?;
    }

    info!(design_id, family_id, "new family created by name-pattern fallback");
    Ok(Some(serde_json::json!({ "created_family": family_id, "confidence": 0.5 })))
}
