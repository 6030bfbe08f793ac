use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::extract::{local_midnight, ParsedEvent};

/// Number of messages per user per day.
///
/// Every day present holds at least one user, and every user a count of at least one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageTable {
    days: BTreeMap<NaiveDate, BTreeMap<Vec<u8>, u64>>,
}

/// A single `(date, user, count)` row of a [MessageTable]. The user holds the matched bytes as
/// they appeared in the log.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entry {
    pub date: NaiveDate,
    pub user: Vec<u8>,
    pub count: u64,
}

impl Entry {
    pub fn timestamp(&self) -> i64 {
        local_midnight(self.date)
    }
}

impl MessageTable {
    pub fn new() -> Self {
        MessageTable::default()
    }

    /// Counts one more message of `event.user` on `event.date`.
    pub fn record(&mut self, event: ParsedEvent) {
        self.add(event.date, event.user, 1);
    }

    fn add(&mut self, date: NaiveDate, user: Vec<u8>, count: u64) {
        *self.days.entry(date).or_default().entry(user).or_insert(0) += count;
    }

    /// Every recorded `(date, user)` pair once, with its cumulative count.
    ///
    /// Rows come out ordered by date, then user, but callers should not depend on that.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.days
            .iter()
            .flat_map(|(date, users)| {
                users.iter().map(move |(user, count)| Entry {
                    date: *date,
                    user: user.clone(),
                    count: *count,
                })
            })
            .collect()
    }

    pub fn merge(mut self, other: MessageTable) -> Self {
        other.days.into_iter().for_each(|(date, users)| {
            users
                .into_iter()
                .for_each(|(user, count)| self.add(date, user, count))
        });
        self
    }

    pub fn count<U: AsRef<[u8]> + ?Sized>(&self, date: NaiveDate, user: &U) -> Option<u64> {
        self.days
            .get(&date)
            .and_then(|users| users.get(user.as_ref()))
            .copied()
    }

    /// Number of distinct `(date, user)` pairs.
    pub fn len(&self) -> usize {
        self.days.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
