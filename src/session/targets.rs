//! Account selection and target list construction

use crate::collaborators::Directory;
use crate::error::Result;
use crate::types::{DeadPeriod, Period, Target};
use rand::seq::SliceRandom;
use std::collections::HashSet;

use super::AccountSelection;

/// Lower-case, trim and de-duplicate an explicit account list, keeping order
pub(crate) fn normalize_accounts(accounts: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    accounts
        .iter()
        .map(|account| account.trim().to_lowercase())
        .filter(|account| !account.is_empty())
        .filter(|account| seen.insert(account.clone()))
        .collect()
}

/// Accounts a normal (non-rescrape) run works on
pub(crate) async fn resolve_accounts(
    directory: &dyn Directory,
    selection: &AccountSelection,
) -> Result<Vec<String>> {
    match selection {
        AccountSelection::All => directory.list_accounts().await,
        AccountSelection::Sample(size) => {
            let accounts = directory.list_accounts().await?;
            let mut rng = rand::thread_rng();
            let sample: Vec<String> = accounts
                .choose_multiple(&mut rng, *size)
                .cloned()
                .collect();
            tracing::info!(
                requested = *size,
                available = accounts.len(),
                sampled = sample.len(),
                "Sampled accounts"
            );
            Ok(sample)
        }
        AccountSelection::List { accounts, only_new } => {
            let accounts = normalize_accounts(accounts);
            if !*only_new {
                return Ok(accounts);
            }

            let mut fresh = Vec::with_capacity(accounts.len());
            for account in accounts {
                if directory.account_exists(&account).await? {
                    tracing::debug!(account = %account, "Skipping known account");
                } else {
                    fresh.push(account);
                }
            }
            tracing::info!(new_accounts = fresh.len(), "Filtered account list to new accounts");
            Ok(fresh)
        }
        // Rescrape runs take their targets from the event log
        AccountSelection::DeadPeriods { .. } => Ok(Vec::new()),
    }
}

/// Profile targets, one per account
pub(crate) fn profile_targets(accounts: &[String]) -> Vec<Target> {
    accounts.iter().map(Target::profile).collect()
}

/// Flatten per-account plans into tweet targets, account by account
pub(crate) fn tweet_targets(plans: Vec<(String, Vec<Period>)>) -> Vec<Target> {
    plans
        .into_iter()
        .flat_map(|(account, periods)| {
            periods
                .into_iter()
                .map(move |period| Target::tweets(account.clone(), period))
        })
        .collect()
}

/// Tweet targets for exactly the given dead (account, period) pairs
pub(crate) fn dead_period_targets(dead: Vec<DeadPeriod>) -> Vec<Target> {
    let mut seen = HashSet::new();
    dead.into_iter()
        .filter(|d| seen.insert((d.account.clone(), d.period)))
        .map(|d| Target::tweets(d.account, d.period))
        .collect()
}

/// Split `targets` into at most `workers` contiguous, disjoint slices
pub(crate) fn partition(targets: Vec<Target>, workers: usize) -> Vec<Vec<Target>> {
    if targets.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, targets.len());
    let chunk_size = targets.len().div_ceil(workers);
    targets
        .chunks(chunk_size)
        .map(<[Target]>::to_vec)
        .collect()
}
