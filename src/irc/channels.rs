/// Channel records and the channel table.
///
/// A channel owns its member, operator and invitation sets as descriptor
/// sets; resolving a descriptor back to a user goes through the user
/// table. Lookup keys are case-folded, the record keeps the original
/// spelling for echoes.
use std::collections::{HashMap, HashSet};
use std::os::fd::RawFd;

use super::users::fold;

/// Maximum channel name length in bytes.
pub const MAX_CHANNEL_NAME_LEN: usize = 200;

/// A channel name is 1–200 bytes, starts with `#` or `&`, and contains no
/// space, comma or BEL.
pub fn is_valid_channel_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_CHANNEL_NAME_LEN {
        return false;
    }
    if bytes[0] != b'#' && bytes[0] != b'&' {
        return false;
    }
    bytes.iter().all(|&b| b != b' ' && b != b',' && b != 0x07)
}

/// One named conversation.
#[derive(Debug)]
pub struct Channel {
    /// Original-case name; first character is `#` or `&`.
    pub name: String,
    /// Topic; empty means unset.
    pub topic: String,
    /// Descriptors of current members.
    pub members: HashSet<RawFd>,
    /// Descriptors of channel operators; always a subset of `members`.
    pub operators: HashSet<RawFd>,
    /// Descriptors holding a pending invitation for `+i` entry.
    pub invited: HashSet<RawFd>,
    /// Mode `+i`.
    pub invite_only: bool,
    /// Mode `+t`. Defaults to true: only operators may change the topic.
    pub topic_restricted: bool,
    /// Mode `+l`.
    pub user_limit: Option<usize>,
    /// Mode `+k`.
    pub key: Option<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: String::new(),
            members: HashSet::new(),
            operators: HashSet::new(),
            invited: HashSet::new(),
            invite_only: false,
            topic_restricted: true,
            user_limit: None,
            key: None,
        }
    }

    pub fn is_member(&self, fd: RawFd) -> bool {
        self.members.contains(&fd)
    }

    pub fn is_operator(&self, fd: RawFd) -> bool {
        self.operators.contains(&fd)
    }

    pub fn is_invited(&self, fd: RawFd) -> bool {
        self.invited.contains(&fd)
    }

    pub fn add_member(&mut self, fd: RawFd) {
        self.members.insert(fd);
        self.invited.remove(&fd);
    }

    /// Drop a member and any operator or invitation entry it held.
    pub fn remove_member(&mut self, fd: RawFd) {
        self.members.remove(&fd);
        self.operators.remove(&fd);
        self.invited.remove(&fd);
    }

    /// Render current modes as the 324 payload: a flag string plus the
    /// arguments for the flags that carry one.
    pub fn mode_string(&self) -> (String, Vec<String>) {
        let mut flags = String::from("+");
        let mut args = Vec::new();

        if self.invite_only {
            flags.push('i');
        }
        if self.topic_restricted {
            flags.push('t');
        }
        if let Some(ref key) = self.key {
            flags.push('k');
            args.push(key.clone());
        }
        if let Some(limit) = self.user_limit {
            flags.push('l');
            args.push(limit.to_string());
        }

        (flags, args)
    }
}

/// Owner of every [`Channel`], keyed by folded name.
#[derive(Debug, Default)]
pub struct ChannelTable {
    by_name: HashMap<String, Channel>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.by_name.get(&fold(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.by_name.get_mut(&fold(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(&fold(name))
    }

    /// Fetch a channel, creating it with `name`'s spelling if absent.
    /// Returns the channel and whether it was just created.
    pub fn get_or_create(&mut self, name: &str) -> (&mut Channel, bool) {
        let key = fold(name);
        let created = !self.by_name.contains_key(&key);
        let channel = self
            .by_name
            .entry(key)
            .or_insert_with(|| Channel::new(name));
        (channel, created)
    }

    pub fn remove(&mut self, name: &str) -> Option<Channel> {
        self.by_name.remove(&fold(name))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Channel)> {
        self.by_name.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Channel)> {
        self.by_name.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Channel name validation ──────────────────────────────────

    #[test]
    fn valid_channel_names() {
        for name in ["#team", "&local", "#a", "#with-dash", "#UPPER"] {
            assert!(is_valid_channel_name(name), "{name} should be valid");
        }
        assert!(is_valid_channel_name(&format!(
            "#{}",
            "c".repeat(MAX_CHANNEL_NAME_LEN - 1)
        )));
    }

    #[test]
    fn invalid_channel_names() {
        for name in ["", "team", "#has space", "#has,comma", "#has\x07bell", "+plus"] {
            assert!(!is_valid_channel_name(name), "{name:?} should be invalid");
        }
        assert!(!is_valid_channel_name(&format!(
            "#{}",
            "c".repeat(MAX_CHANNEL_NAME_LEN)
        )));
    }

    // ── Channel record ───────────────────────────────────────────

    #[test]
    fn new_channel_defaults_to_topic_restricted() {
        let channel = Channel::new("#team");
        assert!(channel.topic_restricted);
        assert!(!channel.invite_only);
        assert_eq!(channel.user_limit, None);
        assert_eq!(channel.key, None);
        assert_eq!(channel.mode_string().0, "+t");
    }

    #[test]
    fn add_member_clears_invitation() {
        let mut channel = Channel::new("#team");
        channel.invited.insert(7);
        channel.add_member(7);
        assert!(channel.is_member(7));
        assert!(!channel.is_invited(7));
    }

    #[test]
    fn remove_member_clears_operator_and_invite() {
        let mut channel = Channel::new("#team");
        channel.add_member(7);
        channel.operators.insert(7);
        channel.invited.insert(9);
        channel.remove_member(7);
        channel.remove_member(9);

        assert!(!channel.is_member(7));
        assert!(!channel.is_operator(7));
        assert!(!channel.is_invited(9));
    }

    #[test]
    fn mode_string_lists_flags_and_args_in_order() {
        let mut channel = Channel::new("#team");
        channel.invite_only = true;
        channel.key = Some("hunter2".into());
        channel.user_limit = Some(10);

        let (flags, args) = channel.mode_string();
        assert_eq!(flags, "+itkl");
        assert_eq!(args, vec!["hunter2", "10"]);
    }

    // ── Table ────────────────────────────────────────────────────

    #[test]
    fn lookup_is_case_insensitive_and_case_preserving() {
        let mut table = ChannelTable::new();
        let (channel, created) = table.get_or_create("#Team");
        assert!(created);
        assert_eq!(channel.name, "#Team");

        assert!(table.exists("#team"));
        assert_eq!(table.get("#TEAM").unwrap().name, "#Team");

        let (_, created_again) = table.get_or_create("#team");
        assert!(!created_again);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_deletes_the_channel() {
        let mut table = ChannelTable::new();
        table.get_or_create("#team");
        assert!(table.remove("#TEAM").is_some());
        assert!(!table.exists("#team"));
        assert!(table.is_empty());
    }
}
