//! End-to-end referral flow: invite claim, signup bonuses, activation.

mod common;

use common::{test_ctx, CLAIMER, REFERRER_A, REFERRER_B};

use cgc_ledgerd::referrals::invites::ClaimResult;
use cgc_ledgerd::storage::RewardFilter;

const ONE_CGC: u128 = 1_000_000_000_000_000_000;

#[tokio::test]
async fn first_claim_distributes_second_claim_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    ctx.invites
        .create(Some("ABC123".into()), REFERRER_A, None, None)
        .await
        .unwrap();

    let first = ctx.invites.claim("ABC123", CLAIMER, true, None).await.unwrap();
    assert!(matches!(
        first,
        ClaimResult::Claimed {
            bonus_distributed: true,
            referral_levels: 1,
        }
    ));

    // Identical repeat: no new rows, no new rewards.
    let second = ctx.invites.claim("ABC123", CLAIMER, true, None).await.unwrap();
    assert!(matches!(
        second,
        ClaimResult::AlreadyClaimed {
            already_claimed: true
        }
    ));

    let invite = ctx.storage.get_invite("ABC123").await.unwrap().unwrap();
    assert_eq!(invite.total_claims, 1);
    assert_eq!(ctx.storage.count_invite_claims("ABC123").await.unwrap(), 1);

    // Signup bonus to the claimer, level-1 commission to the referrer.
    let claimer_rewards = ctx
        .storage
        .list_rewards(CLAIMER, &RewardFilter::default(), 10, 0)
        .await
        .unwrap();
    assert_eq!(claimer_rewards.len(), 1);
    assert_eq!(claimer_rewards[0].reward_type, "signup_bonus");
    assert_eq!(claimer_rewards[0].status, "pending");

    let referrer_rewards = ctx
        .storage
        .list_rewards(REFERRER_A, &RewardFilter::default(), 10, 0)
        .await
        .unwrap();
    assert_eq!(referrer_rewards.len(), 1);
    assert_eq!(referrer_rewards[0].reward_type, "signup_commission_l1");
    assert_eq!(referrer_rewards[0].referred_address.as_deref(), Some(CLAIMER));
}

#[tokio::test]
async fn claim_walks_the_referrer_chain_up_to_three_levels() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    // A referred B earlier; now B's invite is claimed by C.
    ctx.invites
        .create(Some("LEVEL1".into()), REFERRER_A, None, None)
        .await
        .unwrap();
    ctx.invites.claim("LEVEL1", REFERRER_B, true, None).await.unwrap();

    ctx.invites
        .create(Some("LEVEL2".into()), REFERRER_B, None, None)
        .await
        .unwrap();
    let result = ctx.invites.claim("LEVEL2", CLAIMER, true, None).await.unwrap();
    assert!(matches!(
        result,
        ClaimResult::Claimed {
            referral_levels: 2,
            ..
        }
    ));

    let pending = ctx.storage.list_pending_referrals(CLAIMER).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].level, 1);
    assert_eq!(pending[0].referrer_address, REFERRER_B);
    assert_eq!(pending[1].level, 2);
    assert_eq!(pending[1].referrer_address, REFERRER_A);
}

#[tokio::test]
async fn claim_validations() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    ctx.invites
        .create(Some("GUARD".into()), REFERRER_A, Some(1), None)
        .await
        .unwrap();

    // Self-claim.
    assert!(ctx.invites.claim("GUARD", REFERRER_A, true, None).await.is_err());
    // Unknown code is a 404.
    assert!(ctx.invites.claim("NOPE", CLAIMER, true, None).await.is_err());

    // Paused invite rejects claims.
    ctx.invites.set_status("GUARD", "paused").await.unwrap();
    assert!(ctx.invites.claim("GUARD", CLAIMER, true, None).await.is_err());
    ctx.invites.set_status("GUARD", "active").await.unwrap();

    // Claim cap: first claim fills the single slot, the next wallet is out.
    ctx.invites.claim("GUARD", CLAIMER, true, None).await.unwrap();
    assert!(ctx.invites.claim("GUARD", REFERRER_B, true, None).await.is_err());
}

#[tokio::test]
async fn activation_is_a_noop_while_the_balance_is_zero() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _chain) = test_ctx(dir.path()).await;

    ctx.invites
        .create(Some("ZERO".into()), REFERRER_A, None, None)
        .await
        .unwrap();
    ctx.invites.claim("ZERO", CLAIMER, true, None).await.unwrap();

    let outcome = ctx.activation.check_and_activate(CLAIMER).await.unwrap();
    assert!(!outcome.activated);
    assert_eq!(outcome.reason.as_deref(), Some("zero CGC balance"));

    // Still pending; retries are safe.
    assert_eq!(
        ctx.storage.list_pending_referrals(CLAIMER).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn nonzero_balance_activates_and_mints_commissions_once() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, chain) = test_ctx(dir.path()).await;

    ctx.invites
        .create(Some("CHAIN1".into()), REFERRER_A, None, None)
        .await
        .unwrap();
    ctx.invites.claim("CHAIN1", REFERRER_B, true, None).await.unwrap();
    ctx.invites
        .create(Some("CHAIN2".into()), REFERRER_B, None, None)
        .await
        .unwrap();
    ctx.invites.claim("CHAIN2", CLAIMER, true, None).await.unwrap();

    chain.set_balance(CLAIMER, 5 * ONE_CGC);
    let outcome = ctx.activation.check_and_activate(CLAIMER).await.unwrap();
    assert!(outcome.activated);
    assert_eq!(outcome.balance, Some(5.0));

    assert!(ctx.storage.list_pending_referrals(CLAIMER).await.unwrap().is_empty());

    // Activation bonus for the claimer plus one commission per level.
    let claimer_rewards = ctx
        .storage
        .list_rewards(CLAIMER, &RewardFilter::default(), 10, 0)
        .await
        .unwrap();
    let types: Vec<&str> = claimer_rewards.iter().map(|r| r.reward_type.as_str()).collect();
    assert!(types.contains(&"signup_bonus"));
    assert!(types.contains(&"activation_bonus"));

    let direct = ctx
        .storage
        .list_rewards(
            REFERRER_B,
            &RewardFilter {
                reward_type: Some("direct_bonus".into()),
                ..Default::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(direct.len(), 1);

    let level2 = ctx
        .storage
        .list_rewards(
            REFERRER_A,
            &RewardFilter {
                reward_type: Some("level2_bonus".into()),
                ..Default::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(level2.len(), 1);

    // The direct referrer's activation counter was bumped.
    let collab = ctx.storage.get_collaborator(REFERRER_B).await.unwrap().unwrap();
    assert_eq!(collab.referrals_activated, 1);

    // Second pass finds nothing pending and mints nothing new.
    let again = ctx.activation.check_and_activate(CLAIMER).await.unwrap();
    assert!(!again.activated);
    assert_eq!(again.reason.as_deref(), Some("no pending referrals"));
    let after = ctx
        .storage
        .list_rewards(CLAIMER, &RewardFilter::default(), 10, 0)
        .await
        .unwrap();
    assert_eq!(after.len(), claimer_rewards.len());
}
