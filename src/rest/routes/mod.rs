pub mod collaborators;
pub mod grants;
pub mod health;
pub mod proposals;
pub mod referrals;
pub mod rewards;
pub mod tasks;

use crate::error::ApiError;
use crate::wallet;
use crate::AppContext;

/// Resolve and authorize an admin caller wallet.
pub(crate) async fn require_admin(ctx: &AppContext, raw_wallet: &str) -> Result<String, ApiError> {
    let wallet = wallet::normalize(raw_wallet)
        .ok_or_else(|| ApiError::validation("invalid wallet address"))?;
    if ctx.admins.is_admin(&wallet).await {
        Ok(wallet)
    } else {
        Err(ApiError::forbidden("wallet is not an admin"))
    }
}
