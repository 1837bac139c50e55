//! Proposal lifecycle and conversion into tasks.

mod common;

use common::{test_ctx, CLAIMER, REFERRER_A};

#[tokio::test]
async fn submit_validations() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    assert!(ctx
        .proposals
        .submit("Title", "Body", "not-a-wallet", None, None)
        .await
        .is_err());
    assert!(ctx
        .proposals
        .submit("  ", "Body", REFERRER_A, None, None)
        .await
        .is_err());
    assert!(ctx
        .proposals
        .submit("Title", "Body", REFERRER_A, Some(-5.0), None)
        .await
        .is_err());
    assert!(ctx
        .proposals
        .submit("Title", "Body", REFERRER_A, Some(100.0), Some(11))
        .await
        .is_err());
}

#[tokio::test]
async fn approval_converts_into_an_open_task_transactionally() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    let proposal = ctx
        .proposals
        .submit("Build the dashboard", "Details", REFERRER_A, Some(150.0), Some(3))
        .await
        .unwrap();
    assert_eq!(proposal.status, "pending");

    // Straight to approve is rejected; voting must open first.
    assert!(ctx.proposals.approve(&proposal.id, None, None).await.is_err());

    let voting = ctx.proposals.start_voting(&proposal.id).await.unwrap();
    assert_eq!(voting.status, "voting");
    // Re-opening voting on a voting proposal fails.
    assert!(ctx.proposals.start_voting(&proposal.id).await.is_err());

    let approved = ctx.proposals.approve(&proposal.id, None, None).await.unwrap();
    assert_eq!(approved.proposal.status, "converted");
    assert_eq!(
        approved.proposal.resulting_task_id.as_deref(),
        Some(approved.task.id.as_str())
    );
    assert_eq!(approved.task.status, "open");
    assert_eq!(approved.task.reward, 150.0);
    assert_eq!(approved.task.complexity, Some(3));
    assert_eq!(approved.task.proposal_id.as_deref(), Some(proposal.id.as_str()));

    // A converted proposal cannot be decided again.
    assert!(ctx.proposals.approve(&proposal.id, None, None).await.is_err());
    assert!(ctx.proposals.reject(&proposal.id, "late").await.is_err());
}

#[tokio::test]
async fn approval_reward_override_and_missing_reward() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    let proposal = ctx
        .proposals
        .submit("No reward set", "Details", REFERRER_A, None, None)
        .await
        .unwrap();
    ctx.proposals.start_voting(&proposal.id).await.unwrap();

    // No stored reward and no override: nothing to put on the task.
    assert!(ctx.proposals.approve(&proposal.id, None, None).await.is_err());
    let still = ctx.proposals.get(&proposal.id).await.unwrap();
    assert_eq!(still.status, "voting");

    let approved = ctx
        .proposals
        .approve(&proposal.id, Some(75.0), Some(2))
        .await
        .unwrap();
    assert_eq!(approved.task.reward, 75.0);
    assert_eq!(approved.task.complexity, Some(2));
}

#[tokio::test]
async fn rejection_requires_a_reason() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    let proposal = ctx
        .proposals
        .submit("Contested", "Details", REFERRER_A, Some(10.0), None)
        .await
        .unwrap();
    ctx.proposals.start_voting(&proposal.id).await.unwrap();

    assert!(ctx.proposals.reject(&proposal.id, "").await.is_err());
    assert!(ctx.proposals.reject(&proposal.id, "   ").await.is_err());

    let rejected = ctx
        .proposals
        .reject(&proposal.id, "duplicate of an earlier proposal")
        .await
        .unwrap();
    assert_eq!(rejected.status, "rejected");
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("duplicate of an earlier proposal")
    );
}

#[tokio::test]
async fn task_assignment_guards() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    let task = ctx.tasks.create("Standalone", "", 30.0, None).await.unwrap();

    // Completing an unassigned task is invalid.
    assert!(ctx.tasks.complete(&task.id).await.is_err());

    let assigned = ctx.tasks.assign(&task.id, CLAIMER).await.unwrap();
    assert_eq!(assigned.status, "assigned");
    assert_eq!(assigned.assignee_wallet.as_deref(), Some(CLAIMER));
    // Double assignment loses the guard.
    assert!(ctx.tasks.assign(&task.id, REFERRER_A).await.is_err());

    let completed = ctx.tasks.complete(&task.id).await.unwrap();
    assert_eq!(completed.status, "completed");
    assert!(completed.completed_at.is_some());
    // Completion is one-shot.
    assert!(ctx.tasks.complete(&task.id).await.is_err());
}

#[tokio::test]
async fn collaborator_sync_repairs_drifted_totals() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    let task = ctx.tasks.create("Repair me", "", 40.0, None).await.unwrap();
    ctx.tasks.assign(&task.id, CLAIMER).await.unwrap();
    ctx.tasks.complete(&task.id).await.unwrap();

    // Corrupt the stored totals, then let the re-scan fix them.
    ctx.storage
        .upsert_collaborator_totals(CLAIMER, 999.0, 7)
        .await
        .unwrap();

    // The read-only report sees the drift but leaves the rows alone.
    let audit = ctx.stats.report().await.unwrap();
    assert_eq!(audit.discrepancies.len(), 1);
    assert_eq!(audit.discrepancies[0].stored_cgc, 999.0);
    assert_eq!(audit.discrepancies[0].expected_cgc, 40.0);
    let untouched = ctx.stats.get(CLAIMER).await.unwrap();
    assert_eq!(untouched.total_cgc_earned, 999.0);
    assert_eq!(untouched.tasks_completed, 7);

    let report = ctx.stats.sync().await.unwrap();
    assert_eq!(report.wallets_scanned, 1);
    assert_eq!(report.discrepancies.len(), 1);
    assert_eq!(report.discrepancies[0].stored_cgc, 999.0);
    assert_eq!(report.discrepancies[0].expected_cgc, 40.0);
    assert_eq!(report.discrepancies[0].expected_tasks, 1);

    let fixed = ctx.stats.get(CLAIMER).await.unwrap();
    assert_eq!(fixed.total_cgc_earned, 40.0);
    assert_eq!(fixed.tasks_completed, 1);

    // A clean second pass reports nothing.
    let clean = ctx.stats.sync().await.unwrap();
    assert!(clean.discrepancies.is_empty());
}
