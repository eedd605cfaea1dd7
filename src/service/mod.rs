use std::sync::{mpsc, Arc, PoisonError, RwLock, RwLockReadGuard};
use std::thread;
use std::time::Duration;

use crate::address::Address;
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::graph::FollowStatus;
use crate::ledger::{
    CounterMismatch, JournalEntry, LedgerCommand, LedgerError, LedgerSnapshot, LedgerState, User,
};
use crate::token::BootstrapTarget;

struct Request {
    caller: Address,
    command: LedgerCommand,
    reply: mpsc::Sender<Result<(), LedgerError>>,
}

/// Shared entry point to a running ledger.
///
/// Mutations are queued on a channel and applied one at a time, in arrival
/// order, by a dedicated writer thread holding the write lock for the whole
/// plan+commit step. Reads go straight to the read lock and therefore only
/// ever see fully committed state.
#[derive(Clone)]
pub struct SquarrinHandle {
    address: Address,
    state: Arc<RwLock<LedgerState>>,
    commands: mpsc::Sender<Request>,
}

impl SquarrinHandle {
    pub fn spawn(address: Address, ledger: LedgerState, clock: Arc<dyn Clock>) -> Self {
        let state = Arc::new(RwLock::new(ledger));
        let (tx, rx) = mpsc::channel::<Request>();
        let writer_state = Arc::clone(&state);
        thread::spawn(move || {
            // Ends once every handle (and so every sender) is dropped.
            for request in rx {
                let result = {
                    let mut guard = writer_state
                        .write()
                        .unwrap_or_else(PoisonError::into_inner);
                    let now = clock.now();
                    guard.execute(&request.caller, request.command, now)
                };
                let _ = request.reply.send(result);
            }
        });
        Self {
            address,
            state,
            commands: tx,
        }
    }

    pub fn from_config(
        address: Address,
        config: &LedgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        let ledger = LedgerState::from_config(config)?;
        Ok(Self::spawn(address, ledger, clock))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Queues `command` and blocks until the writer has applied or rejected it.
    pub fn submit(&self, caller: &Address, command: LedgerCommand) -> Result<(), LedgerError> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(Request {
                caller: *caller,
                command,
                reply,
            })
            .map_err(|_| LedgerError::ServiceUnavailable)?;
        response.recv().map_err(|_| LedgerError::ServiceUnavailable)?
    }

    pub fn register(
        &self,
        caller: &Address,
        user: Address,
        is_content_creator: bool,
    ) -> Result<(), LedgerError> {
        self.submit(
            caller,
            LedgerCommand::Register {
                user,
                is_content_creator,
            },
        )
    }

    pub fn set_content_creator(
        &self,
        caller: &Address,
        user: Address,
        is_content_creator: bool,
    ) -> Result<(), LedgerError> {
        self.submit(
            caller,
            LedgerCommand::SetContentCreator {
                user,
                is_content_creator,
            },
        )
    }

    pub fn follow(
        &self,
        caller: &Address,
        follower: Address,
        followee: Address,
    ) -> Result<(), LedgerError> {
        self.submit(caller, LedgerCommand::Follow { follower, followee })
    }

    pub fn unfollow(
        &self,
        caller: &Address,
        follower: Address,
        followee: Address,
    ) -> Result<(), LedgerError> {
        self.submit(caller, LedgerCommand::Unfollow { follower, followee })
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against a copy of committed state. The lock is released
    /// before `f` runs, so `f` may submit commands through this handle.
    pub fn view<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> T {
        let state = self.read().clone();
        f(&state)
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        self.read().is_admin(address)
    }

    pub fn get_user(&self, user: &Address) -> Result<User, LedgerError> {
        self.read().get_user(user)
    }

    pub fn is_following(&self, follower: &Address, followee: &Address) -> FollowStatus {
        self.read().is_following(follower, followee)
    }

    pub fn followers_of(&self, user: &Address) -> Vec<Address> {
        self.read().followers_of(user)
    }

    pub fn followings_of(&self, user: &Address) -> Vec<Address> {
        self.read().followings_of(user)
    }

    pub fn token_address(&self) -> Option<Address> {
        self.read().token_address()
    }

    pub fn reward_percentage(&self) -> u8 {
        self.read().reward_percentage()
    }

    pub fn following_time_for_reward(&self) -> Duration {
        self.read().following_time_for_reward()
    }

    pub fn last_product_id(&self) -> u64 {
        self.read().last_product_id()
    }

    pub fn events(&self) -> Vec<JournalEntry> {
        self.read().events().to_vec()
    }

    pub fn reconcile(&self) -> Vec<CounterMismatch> {
        self.read().reconcile()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.read().snapshot()
    }
}

impl BootstrapTarget for SquarrinHandle {
    fn address(&self) -> Address {
        self.address
    }

    fn set_token_address(&self, caller: &Address, token: Address) -> Result<(), LedgerError> {
        self.submit(caller, LedgerCommand::SetTokenAddress { token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RewardConfig;

    fn spawn() -> (SquarrinHandle, Address, Arc<ManualClock>) {
        let admin = Address::random();
        let clock = Arc::new(ManualClock::new(1_000));
        let handle = SquarrinHandle::spawn(
            Address::random(),
            LedgerState::new(admin, RewardConfig::with_percentage(5).unwrap()),
            clock.clone(),
        );
        (handle, admin, clock)
    }

    #[test]
    fn timestamps_come_from_the_clock_at_commit() {
        let (handle, admin, clock) = spawn();
        let (a, b) = (Address::random(), Address::random());
        handle.register(&admin, a, true).unwrap();
        clock.advance(30);
        handle.register(&admin, b, false).unwrap();
        clock.advance(30);
        handle.follow(&admin, a, b).unwrap();

        assert_eq!(handle.get_user(&a).unwrap().created_at, 1_000);
        assert_eq!(handle.get_user(&b).unwrap().created_at, 1_030);
        assert_eq!(handle.is_following(&a, &b).following_date, 1_060);
    }

    #[test]
    fn concurrent_bootstrap_binds_exactly_once() {
        let (handle, _, _) = spawn();
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || {
                    let token = Address::random();
                    handle.set_token_address(&token, token).map(|_| token)
                })
            })
            .collect();
        let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        let winners: Vec<Address> = results.iter().filter_map(|r| r.clone().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(handle.token_address(), Some(winners[0]));
        for result in results.iter().filter(|r| r.is_err()) {
            assert_eq!(
                result.clone().unwrap_err(),
                LedgerError::AlreadyBound { token: winners[0] }
            );
        }
    }

    #[test]
    fn concurrent_follows_keep_counters_consistent() {
        let (handle, admin, _) = spawn();
        let users: Vec<Address> = (0..6).map(|_| Address::random()).collect();
        for user in &users {
            handle.register(&admin, *user, false).unwrap();
        }
        let workers: Vec<_> = users
            .iter()
            .map(|follower| {
                let handle = handle.clone();
                let follower = *follower;
                let targets = users.clone();
                thread::spawn(move || {
                    for followee in targets.into_iter().filter(|t| *t != follower) {
                        handle.follow(&admin, follower, followee).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        for user in &users {
            let record = handle.get_user(user).unwrap();
            assert_eq!(record.nb_followers, 5);
            assert_eq!(record.nb_followings, 5);
        }
        assert!(handle.reconcile().is_empty());
        assert_eq!(handle.view(|s| s.edge_count()), 30);
        assert_eq!(handle.events().len(), 6 + 30);
    }

    #[test]
    fn view_closure_can_submit_commands() {
        let (handle, admin, _) = spawn();
        let user = Address::random();
        let result = handle.view(|state| {
            assert!(!state.is_registered(&user));
            handle.register(&admin, user, false)
        });
        assert_eq!(result, Ok(()));
        assert_eq!(handle.view(|state| state.user_count()), 1);
    }

    #[test]
    fn journal_heights_follow_arrival_order() {
        let (handle, admin, _) = spawn();
        for _ in 0..5 {
            handle.register(&admin, Address::random(), false).unwrap();
        }
        let heights: Vec<u64> = handle.events().iter().map(|e| e.height).collect();
        assert_eq!(heights, vec![1, 2, 3, 4, 5]);
    }
}
