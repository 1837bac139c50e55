//! Reward ledger: history aggregates, guarded processing, milestones.

mod common;

use common::{test_ctx, CLAIMER, REFERRER_A};

use cgc_ledgerd::storage::{NewReward, ProcessOutcome};

const TX: &str = "0xabababababababababababababababababababababababababababababababab";
const TX2: &str = "0xcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcd";

async fn mint(
    ctx: &cgc_ledgerd::AppContext,
    reward_type: &str,
    amount: f64,
    recipient: &str,
) -> String {
    ctx.storage
        .create_reward(&NewReward {
            reward_type: reward_type.to_string(),
            amount,
            recipient: recipient.to_string(),
            referred: None,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn history_summary_covers_the_full_filtered_set() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    for _ in 0..5 {
        mint(&ctx, "direct_bonus", 20.0, REFERRER_A).await;
    }
    let paid_id = mint(&ctx, "signup_bonus", 25.0, REFERRER_A).await;
    ctx.rewards.process_single(&paid_id, TX, 100).await.unwrap();

    // Page of one; summary still counts everything.
    let page = ctx
        .rewards
        .history(REFERRER_A, None, None, Some(1), None)
        .await
        .unwrap();
    assert_eq!(page.rewards.len(), 1);
    assert_eq!(page.summary.total_count, 6);
    assert_eq!(page.summary.pending_count, 5);
    assert_eq!(page.summary.paid_count, 1);
    assert_eq!(page.summary.pending_amount, 100.0);
    assert_eq!(page.summary.paid_amount, 25.0);

    // Filters narrow both the page and the summary.
    let filtered = ctx
        .rewards
        .history(REFERRER_A, Some("pending"), Some("direct_bonus"), None, None)
        .await
        .unwrap();
    assert_eq!(filtered.rewards.len(), 5);
    assert_eq!(filtered.summary.total_count, 5);

    // Unknown filter values are rejected, not silently ignored.
    assert!(ctx
        .rewards
        .history(REFERRER_A, Some("bogus"), None, None, None)
        .await
        .is_err());
}

#[tokio::test]
async fn processing_is_write_once() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    let id = mint(&ctx, "signup_bonus", 25.0, CLAIMER).await;

    let first = ctx.rewards.process_single(&id, TX, 100).await.unwrap();
    assert_eq!(first, ProcessOutcome::Processed);

    // A second transaction never overwrites the recorded one.
    let second = ctx.rewards.process_single(&id, TX2, 200).await.unwrap();
    assert_eq!(second, ProcessOutcome::AlreadyProcessed);

    let row = ctx.storage.get_reward(&id).await.unwrap().unwrap();
    assert_eq!(row.status, "paid");
    assert_eq!(row.tx_hash.as_deref(), Some(TX));
    assert_eq!(row.block_number, Some(100));
    assert!(row.paid_at.is_some());

    assert_eq!(
        ctx.rewards.process_single("missing", TX, 1).await.unwrap(),
        ProcessOutcome::NotFound
    );
    // Malformed hashes never reach the database.
    assert!(ctx.rewards.process_single(&id, "0xdead", 1).await.is_err());
}

#[tokio::test]
async fn batch_processing_reports_mixed_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    let a = mint(&ctx, "direct_bonus", 20.0, REFERRER_A).await;
    let b = mint(&ctx, "direct_bonus", 20.0, REFERRER_A).await;
    ctx.rewards.process_single(&b, TX, 50).await.unwrap();

    let ids = vec![a.clone(), b.clone(), "ghost".to_string()];
    let result = ctx.rewards.process_batch(&ids, TX2, 60).await.unwrap();
    assert_eq!(result.processed, vec![a.clone()]);
    assert_eq!(result.already_processed, vec![b]);
    assert_eq!(result.not_found, vec!["ghost".to_string()]);

    let row = ctx.storage.get_reward(&a).await.unwrap().unwrap();
    assert_eq!(row.tx_hash.as_deref(), Some(TX2));

    assert!(ctx.rewards.process_batch(&[], TX, 1).await.is_err());
}

#[tokio::test]
async fn failed_rewards_are_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    let id = mint(&ctx, "signup_bonus", 25.0, CLAIMER).await;
    assert_eq!(
        ctx.rewards.fail(&id, "payout wallet empty").await.unwrap(),
        ProcessOutcome::Processed
    );
    let row = ctx.storage.get_reward(&id).await.unwrap().unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.failure_reason.as_deref(), Some("payout wallet empty"));

    // A later payout attempt cannot resurrect the row.
    assert_eq!(
        ctx.rewards.process_single(&id, TX, 1).await.unwrap(),
        ProcessOutcome::AlreadyProcessed
    );
    assert!(ctx.rewards.fail(&id, "  ").await.is_err());
}

#[tokio::test]
async fn pending_queue_is_oldest_first_and_capped() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    for _ in 0..3 {
        mint(&ctx, "direct_bonus", 20.0, REFERRER_A).await;
    }
    let queue = ctx.rewards.pending(Some(2)).await.unwrap();
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|r| r.status == "pending"));
}

#[tokio::test]
async fn fifth_completed_task_mints_the_milestone_bonus() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    for i in 0..5 {
        let task = ctx
            .tasks
            .create(&format!("task {i}"), "", 10.0, None)
            .await
            .unwrap();
        ctx.tasks.assign(&task.id, CLAIMER).await.unwrap();
        ctx.tasks.complete(&task.id).await.unwrap();
    }

    let collab = ctx.storage.get_collaborator(CLAIMER).await.unwrap().unwrap();
    assert_eq!(collab.tasks_completed, 5);
    assert_eq!(collab.total_cgc_earned, 50.0);

    let milestones = ctx
        .storage
        .list_rewards(
            CLAIMER,
            &cgc_ledgerd::storage::RewardFilter {
                reward_type: Some("milestone_5".into()),
                ..Default::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].amount, 50.0);
}
