//! Chain replication state for one metadata node (spec.md §3, §4.4).
//!
//! `role`, `next`, `prev`, and `skip` are covered by exactly one mutex
//! (the caller holds it via `Mutex<ChainState>`); this type itself never
//! touches the network, so reconfiguration logic can be unit-tested
//! without sockets.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Head,
    Middle,
    Tail,
    Single,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Head => "HEAD",
            Role::Middle => "MIDDLE",
            Role::Tail => "TAIL",
            Role::Single => "SINGLE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ChainState {
    role: Role,
    next: Option<String>,
    prev: Option<String>,
    skip: Option<String>,
}

impl ChainState {
    /// A node starts `TAIL` if constructed with no `next`, else `HEAD`
    /// (spec.md §4.4: "Each node is constructed with an optional `next`
    /// endpoint...").
    pub fn new(next: Option<String>) -> Self {
        let role = if next.is_some() { Role::Head } else { Role::Tail };
        Self {
            role,
            next,
            prev: None,
            skip: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn next(&self) -> Option<String> {
        self.next.clone()
    }

    pub fn prev(&self) -> Option<String> {
        self.prev.clone()
    }

    pub fn skip(&self) -> Option<String> {
        self.skip.clone()
    }

    /// A manifest is only readable at `TAIL`/`SINGLE` (spec.md §3 invariant).
    pub fn is_readable(&self) -> bool {
        matches!(self.role, Role::Tail | Role::Single)
    }

    /// `UPDATE_PREV`: HEAD->MIDDLE, SINGLE->TAIL.
    pub fn set_prev(&mut self, addr: String) {
        self.prev = Some(addr);
        self.role = Self::role_for(&self.prev, &self.next);
    }

    /// `UPDATE_NEXT`: TAIL->MIDDLE, SINGLE->HEAD.
    pub fn set_next(&mut self, addr: String) {
        self.next = Some(addr);
        self.role = Self::role_for(&self.prev, &self.next);
    }

    /// `SET_SKIP`: names the next-next hop, enabling single-failure recovery.
    pub fn set_skip(&mut self, addr: String) {
        self.skip = Some(addr);
    }

    /// `GET_STATUS` response body: `ROLE=<role> NEXT=<port> PREV=<port>`,
    /// with -1 for an unset endpoint.
    pub fn status_line(&self) -> String {
        format!(
            "ROLE={} NEXT={} PREV={}",
            self.role,
            port_of(&self.next),
            port_of(&self.prev)
        )
    }

    /// React to a failed health-check probe of `next`. If a `skip` link is
    /// set, promote it to `next` (clearing `skip`) and return it so the
    /// caller can announce this node as its predecessor. Otherwise this
    /// node loses its successor entirely (becoming TAIL or SINGLE).
    pub fn reconfigure_after_next_failure(&mut self) -> Option<String> {
        if let Some(skip) = self.skip.take() {
            self.next = Some(skip.clone());
            self.role = Self::role_for(&self.prev, &self.next);
            Some(skip)
        } else {
            self.next = None;
            self.role = Self::role_for(&self.prev, &self.next);
            None
        }
    }

    /// Role invariants, spec.md §4.4: TAIL iff `next` unset; HEAD iff
    /// `prev` unset and `next` set; MIDDLE iff both set; SINGLE iff both
    /// unset.
    fn role_for(prev: &Option<String>, next: &Option<String>) -> Role {
        match (prev.is_some(), next.is_some()) {
            (false, false) => Role::Single,
            (false, true) => Role::Head,
            (true, true) => Role::Middle,
            (true, false) => Role::Tail,
        }
    }
}

fn port_of(addr: &Option<String>) -> i64 {
    addr.as_ref()
        .and_then(|a| a.rsplit(':').next())
        .and_then(|p| p.parse::<u16>().ok())
        .map(i64::from)
        .unwrap_or(-1)
}
