//! Kernel version ordering.
//!
//! Orders release strings the way kernel releases are published:
//! `4.19 < 4.19.1 < 5.0-rc1 < 5.0-rc2 < 5.0 < 5.0.1`.
//!
//! Release candidates are rewritten to use `~` (`5.0-rc1` becomes `5.0~rc1`)
//! and the result is compared with the Debian `verrevcmp` rules, where `~`
//! sorts before everything, even the end of the string.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone)]
pub struct KernelVersion {
    release: String,
    key: String,
}

impl KernelVersion {
    pub fn new(release: impl Into<String>) -> Self {
        let release = release.into();
        let key = rc_to_tilde(&release);
        Self { release, key }
    }

    pub fn as_str(&self) -> &str {
        &self.release
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.release)
    }
}

impl PartialEq for KernelVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KernelVersion {}

impl PartialOrd for KernelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KernelVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        verrevcmp(self.key.as_bytes(), other.key.as_bytes())
    }
}

/// Replace every `-rcN` with `~rcN`.
fn rc_to_tilde(release: &str) -> String {
    let mut key = String::with_capacity(release.len());
    let mut rest = release;
    while let Some(pos) = rest.find("-rc") {
        let after = &rest[pos + 3..];
        key.push_str(&rest[..pos]);
        if after.starts_with(|c: char| c.is_ascii_digit()) {
            key.push('~');
        } else {
            key.push('-');
        }
        key.push_str("rc");
        rest = after;
    }
    key.push_str(rest);
    key
}

fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(b'~') => -1,
        Some(c) => i32::from(c) + 256,
    }
}

fn verrevcmp(a: &[u8], b: &[u8]) -> Ordering {
    let (mut i, mut j) = (0, 0);
    let digit_at = |s: &[u8], k: usize| s.get(k).is_some_and(u8::is_ascii_digit);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !digit_at(a, i)) || (j < b.len() && !digit_at(b, j)) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while digit_at(a, i) && digit_at(b, j) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if digit_at(a, i) {
            return Ordering::Greater;
        }
        if digit_at(b, j) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}
