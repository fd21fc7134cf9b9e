//! Lease state machine for containers and blobs.
//!
//! A lease is an immutable value; every operation consumes the current value
//! and produces the next one (or an error). Time-driven transitions are
//! applied by [`Lease::project`] against the operation's logical clock before
//! any other decision is made.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorCode, StorageError, StorageResult};

/// Sentinel duration for an infinite lease.
pub const INFINITE_LEASE_DURATION: i64 = -1;
/// Minimum fixed lease duration in seconds.
pub const MIN_LEASE_DURATION_SECONDS: i64 = 15;
/// Maximum fixed lease duration in seconds.
pub const MAX_LEASE_DURATION_SECONDS: i64 = 60;
/// Maximum lease break period in seconds.
pub const MAX_LEASE_BREAK_PERIOD_SECONDS: i64 = 60;

/// Lease state for containers and blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LeaseState {
    #[default]
    Available,
    Leased,
    Expired,
    Breaking,
    Broken,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Available => "available",
            LeaseState::Leased => "leased",
            LeaseState::Expired => "expired",
            LeaseState::Breaking => "breaking",
            LeaseState::Broken => "broken",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(LeaseState::Available),
            "leased" => Some(LeaseState::Leased),
            "expired" => Some(LeaseState::Expired),
            "breaking" => Some(LeaseState::Breaking),
            "broken" => Some(LeaseState::Broken),
            _ => None,
        }
    }
}

/// Lease status for containers and blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LeaseStatus {
    #[default]
    Unlocked,
    Locked,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Unlocked => "unlocked",
            LeaseStatus::Locked => "locked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unlocked" => Some(LeaseStatus::Unlocked),
            "locked" => Some(LeaseStatus::Locked),
            _ => None,
        }
    }
}

/// Lease duration type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseDurationType {
    Infinite,
    Fixed,
}

impl LeaseDurationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseDurationType::Infinite => "infinite",
            LeaseDurationType::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "infinite" => Some(LeaseDurationType::Infinite),
            "fixed" => Some(LeaseDurationType::Fixed),
            _ => None,
        }
    }
}

/// Lease access conditions supplied with a request.
#[derive(Debug, Clone, Default)]
pub struct LeaseAccessConditions {
    pub lease_id: Option<String>,
}

impl LeaseAccessConditions {
    pub fn with_id(lease_id: impl Into<String>) -> Self {
        Self {
            lease_id: Some(lease_id.into()),
        }
    }

    fn provided_id(&self) -> Option<&str> {
        self.lease_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Lease record embedded in container and blob rows.
///
/// The state/status pair is always one of `(Available, Unlocked)`,
/// `(Leased, Locked)`, `(Expired, Unlocked)`, `(Breaking, Locked)`,
/// `(Broken, Unlocked)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub lease_id: Option<String>,
    pub lease_state: LeaseState,
    pub lease_status: LeaseStatus,
    pub lease_duration_type: Option<LeaseDurationType>,
    pub lease_duration_seconds: Option<i64>,
    pub lease_expire_time: Option<DateTime<Utc>>,
    pub lease_break_time: Option<DateTime<Utc>>,
}

fn ids_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl Lease {
    /// Applies time-driven transitions against the operation's logical clock.
    ///
    /// Idempotent: projecting twice with the same `now` yields the same
    /// lease.
    pub fn project(mut self, now: DateTime<Utc>) -> Lease {
        match self.lease_state {
            LeaseState::Leased
                if self.lease_duration_type == Some(LeaseDurationType::Fixed)
                    && self.lease_expire_time.is_some_and(|t| now > t) =>
            {
                self.lease_state = LeaseState::Expired;
                self.lease_status = LeaseStatus::Unlocked;
                self.lease_duration_type = None;
                self.lease_expire_time = None;
                self.lease_break_time = None;
            }
            LeaseState::Breaking if self.lease_break_time.is_some_and(|t| now > t) => {
                self.lease_state = LeaseState::Broken;
                self.lease_status = LeaseStatus::Unlocked;
                self.lease_duration_type = None;
                self.lease_expire_time = None;
                self.lease_break_time = None;
            }
            _ => {}
        }
        self
    }

    /// Acquires a lease, or refreshes one idempotently when the proposed id
    /// matches the current holder.
    pub fn acquire(
        self,
        now: DateTime<Utc>,
        duration: i64,
        proposed_id: Option<&str>,
    ) -> StorageResult<Lease> {
        match self.lease_state {
            LeaseState::Breaking => {
                return Err(StorageError::new(ErrorCode::LeaseAlreadyPresent));
            }
            LeaseState::Leased => {
                let current = self.lease_id.as_deref().unwrap_or_default();
                match proposed_id {
                    Some(proposed) if ids_match(proposed, current) => {}
                    _ => return Err(StorageError::new(ErrorCode::LeaseAlreadyPresent)),
                }
            }
            LeaseState::Available | LeaseState::Expired | LeaseState::Broken => {}
        }

        let duration_type = if duration == INFINITE_LEASE_DURATION {
            LeaseDurationType::Infinite
        } else if (MIN_LEASE_DURATION_SECONDS..=MAX_LEASE_DURATION_SECONDS).contains(&duration) {
            LeaseDurationType::Fixed
        } else {
            return Err(StorageError::new(ErrorCode::InvalidLeaseDuration));
        };

        let lease_id = proposed_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Lease {
            lease_id: Some(lease_id),
            lease_state: LeaseState::Leased,
            lease_status: LeaseStatus::Locked,
            lease_duration_type: Some(duration_type),
            lease_duration_seconds: (duration_type == LeaseDurationType::Fixed)
                .then_some(duration),
            lease_expire_time: (duration_type == LeaseDurationType::Fixed)
                .then(|| now + Duration::seconds(duration)),
            lease_break_time: None,
        })
    }

    /// Renews an existing lease, resetting its expiry from `now`.
    pub fn renew(self, now: DateTime<Utc>, lease_id: &str) -> StorageResult<Lease> {
        match self.lease_state {
            LeaseState::Available => {
                return Err(StorageError::new(
                    ErrorCode::LeaseIdMismatchWithLeaseOperation,
                ));
            }
            LeaseState::Breaking | LeaseState::Broken => {
                return Err(StorageError::new(ErrorCode::LeaseIsBrokenAndCannotBeRenewed));
            }
            LeaseState::Leased | LeaseState::Expired => {}
        }

        match self.lease_id.as_deref() {
            Some(current) if ids_match(current, lease_id) => {}
            _ => {
                return Err(StorageError::new(
                    ErrorCode::LeaseIdMismatchWithLeaseOperation,
                ));
            }
        }

        let mut lease = self;
        match lease.lease_duration_seconds {
            Some(duration)
                if (MIN_LEASE_DURATION_SECONDS..=MAX_LEASE_DURATION_SECONDS)
                    .contains(&duration) =>
            {
                lease.lease_duration_type = Some(LeaseDurationType::Fixed);
                lease.lease_expire_time = Some(now + Duration::seconds(duration));
            }
            _ => {
                lease.lease_duration_type = Some(LeaseDurationType::Infinite);
                lease.lease_expire_time = None;
            }
        }
        lease.lease_state = LeaseState::Leased;
        lease.lease_status = LeaseStatus::Locked;
        lease.lease_break_time = None;
        Ok(lease)
    }

    /// Changes the lease id. `current_id` must name either the existing id or
    /// the proposed one (retried changes are idempotent).
    pub fn change(self, current_id: &str, proposed_id: &str) -> StorageResult<Lease> {
        match self.lease_state {
            LeaseState::Available | LeaseState::Expired | LeaseState::Broken => {
                return Err(StorageError::new(ErrorCode::LeaseNotPresent));
            }
            LeaseState::Breaking => {
                return Err(StorageError::new(
                    ErrorCode::LeaseIsBreakingAndCannotBeChanged,
                ));
            }
            LeaseState::Leased => {}
        }

        let existing = self.lease_id.as_deref().unwrap_or_default();
        if !ids_match(existing, current_id) && !ids_match(existing, proposed_id) {
            return Err(StorageError::new(
                ErrorCode::LeaseIdMismatchWithLeaseOperation,
            ));
        }

        let mut lease = self;
        lease.lease_id = Some(proposed_id.to_string());
        Ok(lease)
    }

    /// Releases the lease, clearing every lease field.
    pub fn release(self, lease_id: &str) -> StorageResult<Lease> {
        if self.lease_state == LeaseState::Available {
            return Err(StorageError::new(ErrorCode::LeaseIdMismatch));
        }
        match self.lease_id.as_deref() {
            Some(current) if ids_match(current, lease_id) => {}
            _ => return Err(StorageError::new(ErrorCode::LeaseIdMismatch)),
        }
        Ok(Lease::default())
    }

    /// Breaks the lease. Returns the new lease and the remaining break time
    /// in whole seconds.
    pub fn break_lease(
        self,
        now: DateTime<Utc>,
        break_period: Option<i64>,
    ) -> StorageResult<(Lease, i64)> {
        if self.lease_state == LeaseState::Available {
            return Err(StorageError::new(ErrorCode::LeaseNotPresent));
        }
        if let Some(period) = break_period {
            if !(0..=MAX_LEASE_BREAK_PERIOD_SECONDS).contains(&period) {
                return Err(StorageError::new(ErrorCode::InvalidLeaseBreakPeriod));
            }
        }

        let immediate = matches!(
            self.lease_state,
            LeaseState::Expired | LeaseState::Broken
        ) || break_period.unwrap_or(0) == 0;

        if immediate {
            let mut lease = self;
            lease.lease_state = LeaseState::Broken;
            lease.lease_status = LeaseStatus::Unlocked;
            lease.lease_duration_type = None;
            lease.lease_expire_time = None;
            lease.lease_break_time = None;
            return Ok((lease, 0));
        }

        let period = break_period.unwrap_or(0);
        let mut lease = self;
        let mut new_break_time = match lease.lease_duration_type {
            Some(LeaseDurationType::Fixed) => match lease.lease_expire_time {
                Some(expire) => (now + Duration::seconds(period)).min(expire),
                None => now + Duration::seconds(period),
            },
            _ => now + Duration::seconds(period),
        };
        if let Some(prior) = lease.lease_break_time {
            new_break_time = new_break_time.min(prior);
        }

        lease.lease_state = LeaseState::Breaking;
        lease.lease_status = LeaseStatus::Locked;
        lease.lease_break_time = Some(new_break_time);

        let lease_time =
            ((new_break_time - now).num_milliseconds() as f64 / 1000.0).round() as i64;
        Ok((lease, lease_time))
    }

    /// Write gate applied to every mutating blob operation; `mismatch` is the
    /// kind reported on a lease-id mismatch for the target resource.
    pub fn check_write(
        &self,
        conditions: &LeaseAccessConditions,
        mismatch: ErrorCode,
    ) -> StorageResult<()> {
        match self.lease_status {
            LeaseStatus::Locked => self.check_locked(conditions, mismatch),
            LeaseStatus::Unlocked => {
                if conditions.provided_id().is_some() {
                    Err(StorageError::new(ErrorCode::LeaseLost))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Read gate: only the locked case is enforced.
    pub fn check_read(
        &self,
        conditions: &LeaseAccessConditions,
        mismatch: ErrorCode,
    ) -> StorageResult<()> {
        match self.lease_status {
            LeaseStatus::Locked => self.check_locked(conditions, mismatch),
            LeaseStatus::Unlocked => Ok(()),
        }
    }

    fn check_locked(
        &self,
        conditions: &LeaseAccessConditions,
        mismatch: ErrorCode,
    ) -> StorageResult<()> {
        let provided = conditions
            .provided_id()
            .ok_or_else(|| StorageError::new(ErrorCode::LeaseIdMissing))?;
        let current = self.lease_id.as_deref().unwrap_or_default();
        if ids_match(provided, current) {
            Ok(())
        } else {
            Err(StorageError::new(mismatch))
        }
    }

    /// Post-write lease update: a write against an `Expired` or `Broken`
    /// lease collapses it to `Available`/`Unlocked`.
    pub fn collapsed_after_write(self) -> Lease {
        match self.lease_state {
            LeaseState::Expired | LeaseState::Broken => Lease::default(),
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn acquired(duration: i64, now: DateTime<Utc>) -> Lease {
        Lease::default().acquire(now, duration, Some("L1")).unwrap()
    }

    #[test]
    fn acquire_fixed_sets_expiry() {
        let lease = acquired(30, t(0));
        assert_eq!(lease.lease_state, LeaseState::Leased);
        assert_eq!(lease.lease_status, LeaseStatus::Locked);
        assert_eq!(lease.lease_id.as_deref(), Some("L1"));
        assert_eq!(lease.lease_duration_type, Some(LeaseDurationType::Fixed));
        assert_eq!(lease.lease_expire_time, Some(t(30)));
    }

    #[test]
    fn acquire_infinite_has_no_expiry() {
        let lease = Lease::default().acquire(t(0), -1, None).unwrap();
        assert_eq!(lease.lease_duration_type, Some(LeaseDurationType::Infinite));
        assert!(lease.lease_expire_time.is_none());
        assert!(lease.lease_id.is_some());
    }

    #[test]
    fn acquire_rejects_invalid_duration() {
        for duration in [0, 14, 61, 100] {
            let err = Lease::default().acquire(t(0), duration, None).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidLeaseDuration);
        }
    }

    #[test]
    fn acquire_on_leased_requires_matching_id() {
        let lease = acquired(30, t(0));
        let err = lease.clone().acquire(t(5), 30, Some("L2")).unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseAlreadyPresent);
        let err = lease.clone().acquire(t(5), 30, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseAlreadyPresent);

        // Matching proposed id refreshes idempotently.
        let refreshed = lease.acquire(t(5), 30, Some("L1")).unwrap();
        assert_eq!(refreshed.lease_expire_time, Some(t(35)));
    }

    #[test]
    fn acquire_on_breaking_is_rejected() {
        let (lease, _) = acquired(-1, t(0)).break_lease(t(0), Some(30)).unwrap();
        let err = lease.acquire(t(10), 30, Some("L9")).unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseAlreadyPresent);
    }

    #[test]
    fn projection_expires_fixed_lease() {
        let lease = acquired(15, t(0)).project(t(20));
        assert_eq!(lease.lease_state, LeaseState::Expired);
        assert_eq!(lease.lease_status, LeaseStatus::Unlocked);
        assert!(lease.lease_expire_time.is_none());
        // The holder id survives expiry so a matching renew can resurrect it.
        assert_eq!(lease.lease_id.as_deref(), Some("L1"));
    }

    #[test]
    fn projection_is_idempotent() {
        let lease = acquired(15, t(0));
        let once = lease.clone().project(t(20));
        let twice = lease.project(t(20)).project(t(20));
        assert_eq!(once, twice);

        let (breaking, _) = acquired(-1, t(0)).break_lease(t(0), Some(10)).unwrap();
        let once = breaking.clone().project(t(30));
        let twice = breaking.project(t(30)).project(t(30));
        assert_eq!(once, twice);
        assert_eq!(once.lease_state, LeaseState::Broken);
    }

    #[test]
    fn renew_resets_expiry_from_now() {
        let lease = acquired(30, t(0)).renew(t(20), "L1").unwrap();
        assert_eq!(lease.lease_expire_time, Some(t(50)));
        assert_eq!(lease.lease_state, LeaseState::Leased);
    }

    #[test]
    fn renew_after_expiry_with_matching_id_succeeds() {
        let lease = acquired(15, t(0)).project(t(20));
        let renewed = lease.renew(t(20), "L1").unwrap();
        assert_eq!(renewed.lease_state, LeaseState::Leased);
        assert_eq!(renewed.lease_duration_type, Some(LeaseDurationType::Fixed));
        assert_eq!(renewed.lease_expire_time, Some(t(35)));
    }

    #[test]
    fn renew_errors() {
        let err = Lease::default().renew(t(0), "L1").unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIdMismatchWithLeaseOperation);

        let err = acquired(30, t(0)).renew(t(5), "other").unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIdMismatchWithLeaseOperation);

        let (breaking, _) = acquired(-1, t(0)).break_lease(t(0), Some(30)).unwrap();
        let err = breaking.renew(t(5), "L1").unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIsBrokenAndCannotBeRenewed);
    }

    #[test]
    fn change_swaps_id_and_is_idempotent() {
        let lease = acquired(-1, t(0)).change("L1", "L2").unwrap();
        assert_eq!(lease.lease_id.as_deref(), Some("L2"));
        // Retrying the same change matches via the proposed id.
        let lease = lease.change("L1", "L2").unwrap();
        assert_eq!(lease.lease_id.as_deref(), Some("L2"));

        let err = acquired(-1, t(0)).change("bogus", "L3").unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIdMismatchWithLeaseOperation);

        let err = Lease::default().change("L1", "L2").unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseNotPresent);
    }

    #[test]
    fn release_clears_everything() {
        let lease = acquired(30, t(0)).release("L1").unwrap();
        assert_eq!(lease, Lease::default());

        let err = acquired(30, t(0)).release("other").unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIdMismatch);

        let err = Lease::default().release("L1").unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIdMismatch);
    }

    #[test]
    fn break_immediately_without_period() {
        let (lease, lease_time) = acquired(30, t(0)).break_lease(t(5), None).unwrap();
        assert_eq!(lease.lease_state, LeaseState::Broken);
        assert_eq!(lease.lease_status, LeaseStatus::Unlocked);
        assert_eq!(lease_time, 0);
    }

    #[test]
    fn break_with_period_enters_breaking() {
        let (lease, lease_time) = acquired(-1, t(0)).break_lease(t(10), Some(30)).unwrap();
        assert_eq!(lease.lease_state, LeaseState::Breaking);
        assert_eq!(lease.lease_status, LeaseStatus::Locked);
        assert_eq!(lease.lease_break_time, Some(t(40)));
        assert_eq!(lease_time, 30);
    }

    #[test]
    fn break_on_fixed_lease_is_capped_by_expiry() {
        let (lease, lease_time) = acquired(20, t(0)).break_lease(t(5), Some(60)).unwrap();
        assert_eq!(lease.lease_break_time, Some(t(20)));
        assert_eq!(lease_time, 15);
    }

    #[test]
    fn repeated_break_keeps_earlier_break_time() {
        let (lease, _) = acquired(-1, t(0)).break_lease(t(0), Some(20)).unwrap();
        let (lease, lease_time) = lease.break_lease(t(5), Some(60)).unwrap();
        assert_eq!(lease.lease_break_time, Some(t(20)));
        assert_eq!(lease_time, 15);
    }

    #[test]
    fn break_rejects_invalid_period() {
        let err = acquired(-1, t(0)).break_lease(t(0), Some(61)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLeaseBreakPeriod);
        let err = acquired(-1, t(0)).break_lease(t(0), Some(-1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLeaseBreakPeriod);
    }

    #[test]
    fn break_when_available_reports_no_lease() {
        let err = Lease::default().break_lease(t(0), Some(10)).unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseNotPresent);
    }

    #[test]
    fn write_gate() {
        let lease = acquired(30, t(0));
        let mismatch = ErrorCode::LeaseIdMismatchWithBlobOperation;

        let err = lease
            .check_write(&LeaseAccessConditions::default(), mismatch)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIdMissing);

        let err = lease
            .check_write(&LeaseAccessConditions::with_id("other"), mismatch)
            .unwrap_err();
        assert_eq!(err.code, mismatch);

        // Lease id comparison is case-insensitive.
        assert!(lease
            .check_write(&LeaseAccessConditions::with_id("l1"), mismatch)
            .is_ok());

        // Supplying a lease id against an unlocked resource is an error.
        let err = Lease::default()
            .check_write(&LeaseAccessConditions::with_id("L1"), mismatch)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseLost);

        assert!(Lease::default()
            .check_write(&LeaseAccessConditions::default(), mismatch)
            .is_ok());
    }

    #[test]
    fn read_gate_only_enforces_locked() {
        let lease = acquired(30, t(0));
        let mismatch = ErrorCode::LeaseIdMismatchWithBlobOperation;

        let err = lease
            .check_read(&LeaseAccessConditions::default(), mismatch)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIdMissing);

        // A stale id on an unlocked resource is accepted for reads.
        assert!(Lease::default()
            .check_read(&LeaseAccessConditions::with_id("stale"), mismatch)
            .is_ok());
    }

    #[test]
    fn write_collapses_expired_and_broken_leases() {
        let expired = acquired(15, t(0)).project(t(20));
        assert_eq!(expired.collapsed_after_write(), Lease::default());

        let (broken, _) = acquired(-1, t(0)).break_lease(t(0), None).unwrap();
        assert_eq!(broken.collapsed_after_write(), Lease::default());

        let live = acquired(30, t(0));
        assert_eq!(live.clone().collapsed_after_write(), live);
    }

    #[test]
    fn state_status_pairs_stay_consistent() {
        let check = |lease: &Lease| {
            let ok = matches!(
                (lease.lease_state, lease.lease_status),
                (LeaseState::Available, LeaseStatus::Unlocked)
                    | (LeaseState::Leased, LeaseStatus::Locked)
                    | (LeaseState::Expired, LeaseStatus::Unlocked)
                    | (LeaseState::Breaking, LeaseStatus::Locked)
                    | (LeaseState::Broken, LeaseStatus::Unlocked)
            );
            assert!(ok, "invalid pair: {:?}/{:?}", lease.lease_state, lease.lease_status);
        };

        let lease = acquired(15, t(0));
        check(&lease);
        check(&lease.clone().project(t(100)));
        let (breaking, _) = acquired(-1, t(0)).break_lease(t(0), Some(30)).unwrap();
        check(&breaking);
        check(&breaking.clone().project(t(100)));
        check(&breaking.project(t(100)).collapsed_after_write());
    }
}
