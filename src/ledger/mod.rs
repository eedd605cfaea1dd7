use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::{Address, Timestamp};
use crate::admin::AdminRegistry;
use crate::config::{LedgerConfig, RewardConfig};
use crate::graph::{FollowEdge, FollowGraph, FollowStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Squarrin: Only administrators can do this")]
    Unauthorized { caller: Address },
    #[error("Squarrin: User is already registered")]
    AlreadyRegistered { user: Address },
    #[error("Squarrin: User is not registered")]
    NotRegistered { user: Address },
    #[error("Squarrin: Only follow unfollowed user")]
    AlreadyFollowing { follower: Address, followee: Address },
    #[error("Squarrin: Only unfollow following")]
    NotFollowing { follower: Address, followee: Address },
    #[error("Squarrin: Users cannot follow themselves")]
    SelfFollow { user: Address },
    #[error("Squarrin: Invalid percentage number")]
    InvalidPercentage { percentage: u32 },
    #[error("Squarrin: Quadreum address is already set")]
    AlreadyBound { token: Address },
    #[error("Squarrin: ledger service is not running")]
    ServiceUnavailable,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub is_content_creator: bool,
    pub nb_followers: u64,
    pub nb_followings: u64,
    pub created_at: Timestamp,
}

/// A state-changing request as submitted by a caller.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerCommand {
    Register {
        user: Address,
        is_content_creator: bool,
    },
    SetContentCreator {
        user: Address,
        is_content_creator: bool,
    },
    Follow {
        follower: Address,
        followee: Address,
    },
    Unfollow {
        follower: Address,
        followee: Address,
    },
    SetTokenAddress {
        token: Address,
    },
}

/// A checked, infallible state change produced by planning a command.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerMutation {
    CreateUser {
        user: Address,
        is_content_creator: bool,
        created_at: Timestamp,
    },
    SetContentCreator {
        user: Address,
        is_content_creator: bool,
    },
    Link {
        follower: Address,
        followee: Address,
        at: Timestamp,
    },
    Unlink {
        follower: Address,
        followee: Address,
    },
    BindToken {
        token: Address,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    UserRegistered {
        user: Address,
        is_content_creator: bool,
    },
    ContentCreatorSet {
        user: Address,
        is_content_creator: bool,
    },
    Followed {
        follower: Address,
        followee: Address,
    },
    Unfollowed {
        follower: Address,
        followee: Address,
    },
    TokenBound {
        token: Address,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub height: u64,
    pub timestamp: Timestamp,
    pub caller: Address,
    pub event: LedgerEvent,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    pub height: u64,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub admins: Vec<Address>,
    pub users: BTreeMap<Address, User>,
    pub edges: Vec<FollowEdge>,
    pub token: Option<Address>,
    pub reward: RewardConfig,
    pub last_product_id: u64,
    pub state_root: [u8; 32],
}

/// A user whose stored counters disagree with the follow graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterMismatch {
    pub user: Address,
    pub stored: (u64, u64),
    pub derived: (u64, u64),
}

/// The Squarrin state machine. Single writer; every mutating call either
/// applies all of its effects or none of them.
#[derive(Clone, Debug)]
pub struct LedgerState {
    meta: SnapshotMetadata,
    admins: AdminRegistry,
    users: BTreeMap<Address, User>,
    graph: FollowGraph,
    reward: RewardConfig,
    token: Option<Address>,
    last_product_id: u64,
    events: Vec<JournalEntry>,
}

impl LedgerState {
    pub fn new(admin: Address, reward: RewardConfig) -> Self {
        Self {
            meta: SnapshotMetadata::default(),
            admins: AdminRegistry::new(admin),
            users: BTreeMap::new(),
            graph: FollowGraph::new(),
            reward,
            token: None,
            last_product_id: 0,
            events: Vec::new(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let reward = config.validate()?;
        Ok(Self::new(config.admin, reward))
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        self.admins.is_admin(address)
    }

    pub fn get_user(&self, user: &Address) -> Result<User, LedgerError> {
        self.users
            .get(user)
            .copied()
            .ok_or(LedgerError::NotRegistered { user: *user })
    }

    pub fn is_registered(&self, user: &Address) -> bool {
        self.users.contains_key(user)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn is_following(&self, follower: &Address, followee: &Address) -> FollowStatus {
        self.graph.status(follower, followee)
    }

    pub fn followers_of(&self, user: &Address) -> Vec<Address> {
        self.graph.followers_of(user)
    }

    pub fn followings_of(&self, user: &Address) -> Vec<Address> {
        self.graph.followings_of(user)
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn reward_percentage(&self) -> u8 {
        self.reward.reward_percentage()
    }

    pub fn following_time_for_reward(&self) -> Duration {
        self.reward.following_time_for_reward()
    }

    pub fn last_product_id(&self) -> u64 {
        self.last_product_id
    }

    pub fn token_address(&self) -> Option<Address> {
        self.token
    }

    pub fn meta(&self) -> &SnapshotMetadata {
        &self.meta
    }

    pub fn events(&self) -> &[JournalEntry] {
        &self.events
    }

    pub fn journal_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.events {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn register(
        &mut self,
        caller: &Address,
        user: Address,
        is_content_creator: bool,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        self.execute(
            caller,
            LedgerCommand::Register {
                user,
                is_content_creator,
            },
            now,
        )
    }

    pub fn set_content_creator(
        &mut self,
        caller: &Address,
        user: Address,
        is_content_creator: bool,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        self.execute(
            caller,
            LedgerCommand::SetContentCreator {
                user,
                is_content_creator,
            },
            now,
        )
    }

    pub fn follow(
        &mut self,
        caller: &Address,
        follower: Address,
        followee: Address,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        self.execute(caller, LedgerCommand::Follow { follower, followee }, now)
    }

    pub fn unfollow(
        &mut self,
        caller: &Address,
        follower: Address,
        followee: Address,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        self.execute(caller, LedgerCommand::Unfollow { follower, followee }, now)
    }

    pub fn set_token_address(
        &mut self,
        caller: &Address,
        token: Address,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        self.execute(caller, LedgerCommand::SetTokenAddress { token }, now)
    }

    /// Plans `command` against the current state and commits it only if every
    /// precondition holds.
    pub fn execute(
        &mut self,
        caller: &Address,
        command: LedgerCommand,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        let mutations = self.plan(caller, &command, now)?;
        self.commit(caller, mutations, now);
        Ok(())
    }

    /// Checks preconditions in a fixed order: authorization, registration,
    /// then edge state. Never mutates.
    pub fn plan(
        &self,
        caller: &Address,
        command: &LedgerCommand,
        now: Timestamp,
    ) -> Result<Vec<LedgerMutation>, LedgerError> {
        match command {
            LedgerCommand::Register {
                user,
                is_content_creator,
            } => {
                self.require_admin(caller)?;
                if self.is_registered(user) {
                    return Err(LedgerError::AlreadyRegistered { user: *user });
                }
                Ok(vec![LedgerMutation::CreateUser {
                    user: *user,
                    is_content_creator: *is_content_creator,
                    created_at: now,
                }])
            }
            LedgerCommand::SetContentCreator {
                user,
                is_content_creator,
            } => {
                self.require_admin(caller)?;
                self.require_registered(user)?;
                Ok(vec![LedgerMutation::SetContentCreator {
                    user: *user,
                    is_content_creator: *is_content_creator,
                }])
            }
            LedgerCommand::Follow { follower, followee } => {
                self.require_admin(caller)?;
                self.require_registered(follower)?;
                self.require_registered(followee)?;
                if follower == followee {
                    return Err(LedgerError::SelfFollow { user: *follower });
                }
                if self.graph.contains(follower, followee) {
                    return Err(LedgerError::AlreadyFollowing {
                        follower: *follower,
                        followee: *followee,
                    });
                }
                Ok(vec![LedgerMutation::Link {
                    follower: *follower,
                    followee: *followee,
                    at: now,
                }])
            }
            LedgerCommand::Unfollow { follower, followee } => {
                self.require_admin(caller)?;
                self.require_registered(follower)?;
                self.require_registered(followee)?;
                if !self.graph.contains(follower, followee) {
                    return Err(LedgerError::NotFollowing {
                        follower: *follower,
                        followee: *followee,
                    });
                }
                Ok(vec![LedgerMutation::Unlink {
                    follower: *follower,
                    followee: *followee,
                }])
            }
            LedgerCommand::SetTokenAddress { token } => {
                if let Some(bound) = self.token {
                    return Err(LedgerError::AlreadyBound { token: bound });
                }
                Ok(vec![LedgerMutation::BindToken { token: *token }])
            }
        }
    }

    fn require_admin(&self, caller: &Address) -> Result<(), LedgerError> {
        if !self.admins.is_admin(caller) {
            return Err(LedgerError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn require_registered(&self, user: &Address) -> Result<(), LedgerError> {
        if !self.is_registered(user) {
            return Err(LedgerError::NotRegistered { user: *user });
        }
        Ok(())
    }

    fn commit(&mut self, caller: &Address, mutations: Vec<LedgerMutation>, now: Timestamp) {
        let height = self.meta.height + 1;
        for mutation in mutations {
            let event = match mutation {
                LedgerMutation::CreateUser {
                    user,
                    is_content_creator,
                    created_at,
                } => {
                    self.users.insert(
                        user,
                        User {
                            is_content_creator,
                            nb_followers: 0,
                            nb_followings: 0,
                            created_at,
                        },
                    );
                    LedgerEvent::UserRegistered {
                        user,
                        is_content_creator,
                    }
                }
                LedgerMutation::SetContentCreator {
                    user,
                    is_content_creator,
                } => {
                    if let Some(entry) = self.users.get_mut(&user) {
                        entry.is_content_creator = is_content_creator;
                    }
                    LedgerEvent::ContentCreatorSet {
                        user,
                        is_content_creator,
                    }
                }
                LedgerMutation::Link {
                    follower,
                    followee,
                    at,
                } => {
                    self.graph.link(follower, followee, at);
                    if let Some(entry) = self.users.get_mut(&follower) {
                        entry.nb_followings += 1;
                    }
                    if let Some(entry) = self.users.get_mut(&followee) {
                        entry.nb_followers += 1;
                    }
                    LedgerEvent::Followed { follower, followee }
                }
                LedgerMutation::Unlink { follower, followee } => {
                    self.graph.unlink(&follower, &followee);
                    if let Some(entry) = self.users.get_mut(&follower) {
                        entry.nb_followings = entry.nb_followings.saturating_sub(1);
                    }
                    if let Some(entry) = self.users.get_mut(&followee) {
                        entry.nb_followers = entry.nb_followers.saturating_sub(1);
                    }
                    LedgerEvent::Unfollowed { follower, followee }
                }
                LedgerMutation::BindToken { token } => {
                    self.token = Some(token);
                    LedgerEvent::TokenBound { token }
                }
            };
            self.events.push(JournalEntry {
                height,
                timestamp: now,
                caller: *caller,
                event,
            });
        }
        self.meta.height = height;
        self.meta.timestamp = now;
    }

    /// Full scan comparing stored counters with the edges actually present.
    pub fn reconcile(&self) -> Vec<CounterMismatch> {
        let mut derived: BTreeMap<Address, (u64, u64)> = BTreeMap::new();
        for edge in self.graph.edges() {
            derived.entry(edge.followee).or_default().0 += 1;
            derived.entry(edge.follower).or_default().1 += 1;
        }
        let mut mismatches = Vec::new();
        for (address, user) in &self.users {
            let stored = (user.nb_followers, user.nb_followings);
            let expected = derived.remove(address).unwrap_or_default();
            if stored != expected {
                mismatches.push(CounterMismatch {
                    user: *address,
                    stored,
                    derived: expected,
                });
            }
        }
        // Edges touching addresses that were never registered.
        for (address, expected) in derived {
            mismatches.push(CounterMismatch {
                user: address,
                stored: (0, 0),
                derived: expected,
            });
        }
        mismatches
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            admins: self.admins.iter().copied().collect(),
            users: self.users.clone(),
            edges: self.graph.edges().collect(),
            token: self.token,
            reward: self.reward,
            last_product_id: self.last_product_id,
            state_root: compute_state_root(&self.admins, &self.users, &self.graph, self.token),
        }
    }
}

fn compute_state_root(
    admins: &AdminRegistry,
    users: &BTreeMap<Address, User>,
    graph: &FollowGraph,
    token: Option<Address>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for admin in admins.iter() {
        let mut hasher = Sha256::new();
        hasher.update(b"admin");
        hasher.update(admin.as_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (address, user) in users {
        let mut hasher = Sha256::new();
        hasher.update(b"user");
        hasher.update(address.as_bytes());
        hasher.update([user.is_content_creator as u8]);
        hasher.update(user.nb_followers.to_le_bytes());
        hasher.update(user.nb_followings.to_le_bytes());
        hasher.update(user.created_at.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for edge in graph.edges() {
        let mut hasher = Sha256::new();
        hasher.update(b"edge");
        hasher.update(edge.follower.as_bytes());
        hasher.update(edge.followee.as_bytes());
        hasher.update(edge.following_date.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    if let Some(token) = token {
        let mut hasher = Sha256::new();
        hasher.update(b"token");
        hasher.update(token.as_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"squarrin-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
