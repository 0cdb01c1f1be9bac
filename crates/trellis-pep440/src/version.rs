use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// The kind of a pre-release segment.
///
/// The textual aliases (`alpha`, `c`, `pre`, `preview`) are collapsed to the
/// canonical spellings during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrereleaseKind {
    /// `a`
    Alpha,
    /// `b`
    Beta,
    /// `rc`
    Rc,
}

impl Display for PrereleaseKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

/// A pre-release segment such as `a1` or `rc3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prerelease {
    /// Whether it is an alpha, beta or release candidate.
    pub kind: PrereleaseKind,
    /// The number, e.g. the `1` in `a1`. Zero when omitted in the source.
    pub number: u64,
}

impl Display for Prerelease {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.number)
    }
}

/// One segment of a local version, e.g. `ubuntu` or `1` in `1.0+ubuntu.1`.
///
/// Numeric segments sort after string segments, string segments sort
/// lexicographically among themselves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    /// Not-parseable as integer segment of a local version.
    String(String),
    /// A numeric segment of a local version.
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(string) => write!(f, "{string}"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

/// A version number such as `1.2.3` or `4!5.6.7-a8.post9.dev0`.
///
/// The textual form is preserved through parsing: `1.0` and `1.0.0` compare
/// and hash as equal, but each round-trips to its own string.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<Prerelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

impl Version {
    /// Create a new version from release segments, e.g. `Version::new([1, 2, 3])`.
    ///
    /// # Panics
    ///
    /// When the iterator yields no elements.
    pub fn new(release: impl IntoIterator<Item = u64>) -> Self {
        let release: Vec<u64> = release.into_iter().collect();
        assert!(!release.is_empty(), "a version must have a release segment");
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// Set the epoch and return the updated version.
    #[must_use]
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Set the pre-release segment and return the updated version.
    #[must_use]
    pub fn with_pre(mut self, pre: Option<Prerelease>) -> Self {
        self.pre = pre;
        self
    }

    /// Set the post-release segment and return the updated version.
    #[must_use]
    pub fn with_post(mut self, post: Option<u64>) -> Self {
        self.post = post;
        self
    }

    /// Set the dev-release segment and return the updated version.
    #[must_use]
    pub fn with_dev(mut self, dev: Option<u64>) -> Self {
        self.dev = dev;
        self
    }

    /// Set the local segments and return the updated version.
    #[must_use]
    pub fn with_local(mut self, local: Vec<LocalSegment>) -> Self {
        self.local = local;
        self
    }

    /// Returns the epoch of this version.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the release number part of the version.
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Returns the pre-release part of this version, if it exists.
    pub fn pre(&self) -> Option<Prerelease> {
        self.pre
    }

    /// Returns the post-release part of this version, if it exists.
    pub fn post(&self) -> Option<u64> {
        self.post
    }

    /// Returns the dev-release part of this version, if it exists.
    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    /// Returns the local segments in this version, if any exist.
    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// Whether this is an alpha/beta/rc version.
    pub fn is_pre(&self) -> bool {
        self.pre.is_some()
    }

    /// Whether this is a dev version.
    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    /// Whether this is a post version.
    pub fn is_post(&self) -> bool {
        self.post.is_some()
    }

    /// Whether this is a local version (e.g. `1.2.3+ubuntu.1`).
    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// Whether this is an alpha/beta/rc or dev version.
    pub fn any_prerelease(&self) -> bool {
        self.is_pre() || self.is_dev()
    }

    /// Whether this is a stable version (i.e., _not_ an alpha/beta/rc or dev version).
    pub fn is_stable(&self) -> bool {
        !self.any_prerelease()
    }

    /// The number of segments in the release part, e.g. 2 for `1.0`.
    pub fn precision(&self) -> usize {
        self.release.len()
    }

    /// This version without any pre-release, post-release, dev or local segment.
    ///
    /// Unlike the bump operations, this is defined for every version.
    #[must_use]
    pub fn stable(&self) -> Self {
        Self {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// This version without its local segment.
    #[must_use]
    pub fn without_local(&self) -> Self {
        if self.local.is_empty() {
            self.clone()
        } else {
            Self {
                local: Vec::new(),
                ..self.clone()
            }
        }
    }

    /// The next major version, e.g. `2.0.0` for `1.2.3`.
    pub fn next_major(&self) -> Result<Self, AmbiguousBumpError> {
        self.check_bump("major")?;
        Ok(self.bump_release(0))
    }

    /// The next minor version, e.g. `1.3.0` for `1.2.3`.
    pub fn next_minor(&self) -> Result<Self, AmbiguousBumpError> {
        self.check_bump("minor")?;
        Ok(self.bump_release(1))
    }

    /// The next patch version, e.g. `1.2.4` for `1.2.3`.
    pub fn next_patch(&self) -> Result<Self, AmbiguousBumpError> {
        self.check_bump("patch")?;
        Ok(self.bump_release(2))
    }

    /// The smallest version that is no longer compatible in the caret sense:
    /// the first non-zero release segment is incremented and everything after
    /// it zeroed, e.g. `2.0.0` for `1.2.3`, `0.3.0` for `0.2.3` and `0.0.4`
    /// for `0.0.3`.
    #[must_use]
    pub fn next_breaking(&self) -> Self {
        let stable = self.stable();
        let major = stable.release[0];
        if major != 0 {
            return stable.bump_release(0);
        }
        match (stable.release.len(), stable.release.get(1).copied()) {
            (1, _) => stable.bump_release(0),
            (2, _) | (_, Some(1..)) => stable.bump_release(1),
            _ => stable.bump_release(2),
        }
    }

    /// Bumps are only well-defined on plain releases; a pre/post/dev release
    /// has more than one plausible successor.
    fn check_bump(&self, position: &'static str) -> Result<(), AmbiguousBumpError> {
        if self.pre.is_some() || self.post.is_some() || self.dev.is_some() {
            Err(AmbiguousBumpError {
                version: self.to_string(),
                position,
            })
        } else {
            Ok(())
        }
    }

    /// Increment the release segment at `index`, zeroing all later segments.
    /// The release is padded with zeroes if it has fewer than `index + 1`
    /// segments.
    pub fn bump_release(&self, index: usize) -> Self {
        let mut release = self.release.clone();
        if release.len() <= index {
            release.resize(index + 1, 0);
        }
        release[index] += 1;
        for segment in release.iter_mut().skip(index + 1) {
            *segment = 0;
        }
        Self {
            epoch: self.epoch,
            release,
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// The sort position of the pre/post/dev qualifiers relative to the plain
    /// release: dev < pre < (none) < post, with a pure dev release sorting
    /// below any pre-release of the same release.
    fn qualifier_key(&self) -> (u8, u8, u64, (u8, u64), (u8, u64)) {
        let pre = match (self.pre, self.post, self.dev) {
            // A pure dev release such as `1.0.dev1` sorts below `1.0a1`.
            (None, None, Some(_)) => (0, 0, 0),
            (Some(pre), _, _) => (1, pre.kind as u8 + 1, pre.number),
            (None, _, _) => (2, 0, 0),
        };
        let post = match self.post {
            None => (0, 0),
            Some(number) => (1, number),
        };
        let dev = match self.dev {
            Some(number) => (0, number),
            None => (1, 0),
        };
        (pre.0, pre.1, pre.2, post, dev)
    }
}

/// Compare two release number sequences, padding the shorter with zeroes.
pub(crate) fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    for index in 0..this.len().max(other.len()) {
        let left = this.get(index).copied().unwrap_or_default();
        let right = other.get(index).copied().unwrap_or_default();
        match left.cmp(&right) {
            Ordering::Equal => {}
            ordering => return ordering,
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| self.qualifier_key().cmp(&other.qualifier_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Consistent with equality: trailing zeroes in the release are not
    /// significant, so `1.0` and `1.0.0` hash identically.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        let trimmed = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(&self.release[..0], |last| &self.release[..=last]);
        trimmed.hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let mut release = self.release.iter();
        if let Some(first) = release.next() {
            write!(f, "{first}")?;
        }
        for segment in release {
            write!(f, ".{segment}")?;
        }
        if let Some(pre) = self.pre {
            write!(f, "{pre}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if !self.local.is_empty() {
            write!(f, "+")?;
            let mut local = self.local.iter();
            if let Some(first) = local.next() {
                write!(f, "{first}")?;
            }
            for segment in local {
                write!(f, ".{segment}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let pattern = VersionPattern::from_str(version)?;
        if pattern.is_wildcard() {
            return Err(VersionParseError::new(
                version,
                "wildcard versions are only allowed in version constraints",
            ));
        }
        Ok(pattern.into_version())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

/// A version and whether it ended in a wildcard, e.g. `1.2.*`.
///
/// Wildcards are only legal inside a constraint (`==1.2.*`, a wildcard range);
/// [`Version::from_str`] rejects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPattern {
    version: Version,
    wildcard: bool,
}

impl VersionPattern {
    /// A pattern matching exactly this version.
    pub fn verbatim(version: Version) -> Self {
        Self {
            version,
            wildcard: false,
        }
    }

    /// The version part of the pattern.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the pattern ended in `.*`.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Consume the pattern, returning the version part.
    pub fn into_version(self) -> Version {
        self.version
    }
}

impl FromStr for VersionPattern {
    type Err = VersionParseError;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        Parser::new(version).parse()
    }
}

/// An error when parsing a version such as `1.0a1.dev0`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version `{input}`: {message}")]
pub struct VersionParseError {
    input: String,
    message: String,
}

impl VersionParseError {
    fn new(input: &str, message: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            message: message.into(),
        }
    }
}

/// An error from `next_major`/`next_minor`/`next_patch` on a version with
/// pre/post/dev segments, where the successor is ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot compute the next {position} version of `{version}`: the version has pre-release, post-release or dev segments")]
pub struct AmbiguousBumpError {
    version: String,
    position: &'static str,
}

/// A recursive-descent-free, single-pass parser over the (lowercased) input.
struct Parser<'a> {
    input: &'a str,
    bytes: Vec<u8>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let trimmed = input.trim();
        // `v` prefix is tolerated: `v1.0` parses like `1.0`.
        let trimmed = trimmed
            .strip_prefix(['v', 'V'])
            .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
            .unwrap_or(trimmed);
        Self {
            input,
            bytes: trimmed.to_ascii_lowercase().into_bytes(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<VersionPattern, VersionParseError> {
        let epoch = self.parse_epoch()?;
        let release = self.parse_release()?;
        let pre = self.parse_pre()?;
        let post = self.parse_post()?;
        let dev = self.parse_dev()?;
        let local = self.parse_local()?;
        let wildcard = self.eat_wildcard(pre, post, dev, &local)?;
        if self.pos != self.bytes.len() {
            return Err(self.error(format!(
                "unexpected trailing input `{}`",
                String::from_utf8_lossy(&self.bytes[self.pos..])
            )));
        }
        Ok(VersionPattern {
            version: Version {
                epoch,
                release,
                pre,
                post,
                dev,
                local,
            },
            wildcard,
        })
    }

    fn error(&self, message: impl Into<String>) -> VersionParseError {
        VersionParseError::new(self.input, message)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Eats one of `.`, `-` and `_`, the interchangeable separators.
    fn eat_separator(&mut self) -> bool {
        if matches!(self.peek(), Some(b'.' | b'-' | b'_')) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_number(&mut self) -> Result<Option<u64>, VersionParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("digits are always valid UTF-8");
        match digits.parse::<u64>() {
            Ok(number) => Ok(Some(number)),
            Err(_) => Err(self.error(format!("number `{digits}` is too large"))),
        }
    }

    fn take_word(&mut self) -> &str {
        let start = self.pos;
        while matches!(self.peek(), Some(b'a'..=b'z')) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos]).expect("letters are always valid UTF-8")
    }

    fn parse_epoch(&mut self) -> Result<u64, VersionParseError> {
        let checkpoint = self.pos;
        if let Some(number) = self.take_number()? {
            if self.eat(b'!') {
                return Ok(number);
            }
        }
        self.pos = checkpoint;
        Ok(0)
    }

    fn parse_release(&mut self) -> Result<Vec<u64>, VersionParseError> {
        let mut release = Vec::new();
        let Some(first) = self.take_number()? else {
            return Err(self.error("expected a release number"));
        };
        release.push(first);
        loop {
            let checkpoint = self.pos;
            if !self.eat(b'.') {
                break;
            }
            match self.take_number()? {
                Some(number) => release.push(number),
                None => {
                    // Not a release segment: could be `.post1`, `.dev0` or the
                    // `.*` of a wildcard. A lone trailing `.` fails later as
                    // trailing input.
                    self.pos = checkpoint;
                    break;
                }
            }
        }
        Ok(release)
    }

    fn parse_pre(&mut self) -> Result<Option<Prerelease>, VersionParseError> {
        let checkpoint = self.pos;
        self.eat_separator();
        let kind = match self.take_word() {
            "a" | "alpha" => PrereleaseKind::Alpha,
            "b" | "beta" => PrereleaseKind::Beta,
            "rc" | "c" | "pre" | "preview" => PrereleaseKind::Rc,
            _ => {
                self.pos = checkpoint;
                return Ok(None);
            }
        };
        self.eat_separator();
        let number = self.take_number()?.unwrap_or_default();
        Ok(Some(Prerelease { kind, number }))
    }

    fn parse_post(&mut self) -> Result<Option<u64>, VersionParseError> {
        let checkpoint = self.pos;
        // The implicit post release: `1.0-1` is `1.0.post1`.
        if self.eat(b'-') {
            if let Some(number) = self.take_number()? {
                return Ok(Some(number));
            }
            self.pos = checkpoint;
        }
        self.eat_separator();
        match self.take_word() {
            "post" | "rev" | "r" => {
                self.eat_separator();
                Ok(Some(self.take_number()?.unwrap_or_default()))
            }
            _ => {
                self.pos = checkpoint;
                Ok(None)
            }
        }
    }

    fn parse_dev(&mut self) -> Result<Option<u64>, VersionParseError> {
        let checkpoint = self.pos;
        self.eat_separator();
        if self.take_word() == "dev" {
            self.eat_separator();
            Ok(Some(self.take_number()?.unwrap_or_default()))
        } else {
            self.pos = checkpoint;
            Ok(None)
        }
    }

    fn parse_local(&mut self) -> Result<Vec<LocalSegment>, VersionParseError> {
        if !self.eat(b'+') {
            return Ok(Vec::new());
        }
        let mut segments = Vec::new();
        loop {
            let start = self.pos;
            while matches!(self.peek(), Some(b'a'..=b'z' | b'0'..=b'9')) {
                self.pos += 1;
            }
            if start == self.pos {
                return Err(self.error("expected an alphanumeric local version segment"));
            }
            let segment = std::str::from_utf8(&self.bytes[start..self.pos])
                .expect("alphanumerics are always valid UTF-8");
            segments.push(match segment.parse::<u64>() {
                Ok(number) => LocalSegment::Number(number),
                Err(_) => LocalSegment::String(segment.to_string()),
            });
            if !self.eat_separator() {
                break;
            }
        }
        Ok(segments)
    }

    fn eat_wildcard(
        &mut self,
        pre: Option<Prerelease>,
        post: Option<u64>,
        dev: Option<u64>,
        local: &[LocalSegment],
    ) -> Result<bool, VersionParseError> {
        let checkpoint = self.pos;
        if self.eat(b'.') && self.eat(b'*') {
            if pre.is_some() || post.is_some() || dev.is_some() || !local.is_empty() {
                return Err(
                    self.error("a wildcard may only follow the release segment of a version")
                );
            }
            return Ok(true);
        }
        self.pos = checkpoint;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn version(string: &str) -> Version {
        Version::from_str(string).unwrap()
    }

    #[test]
    fn parse_basic() {
        let parsed = version("1.2.3");
        assert_eq!(parsed.release(), &[1, 2, 3]);
        assert_eq!(parsed.epoch(), 0);
        assert!(parsed.is_stable());
    }

    #[test]
    fn parse_complex() {
        let parsed = version("4!5.6.7-a8.post9.dev0+ubuntu.1");
        assert_eq!(parsed.epoch(), 4);
        assert_eq!(parsed.release(), &[5, 6, 7]);
        assert_eq!(
            parsed.pre(),
            Some(Prerelease {
                kind: PrereleaseKind::Alpha,
                number: 8
            })
        );
        assert_eq!(parsed.post(), Some(9));
        assert_eq!(parsed.dev(), Some(0));
        assert_eq!(
            parsed.local(),
            &[
                LocalSegment::String("ubuntu".to_string()),
                LocalSegment::Number(1)
            ]
        );
    }

    #[test]
    fn parse_normalization() {
        // All pre-release spellings collapse to the canonical ones.
        assert_eq!(version("1.0alpha1"), version("1.0a1"));
        assert_eq!(version("1.0-beta.2"), version("1.0b2"));
        assert_eq!(version("1.0preview3"), version("1.0rc3"));
        assert_eq!(version("1.0c3"), version("1.0rc3"));
        // Omitted numbers default to zero.
        assert_eq!(version("1.0post"), version("1.0.post0"));
        assert_eq!(version("1.0-dev"), version("1.0.dev0"));
        // The implicit post-release form.
        assert_eq!(version("1.0-3"), version("1.0.post3"));
        // Case and `v` prefix.
        assert_eq!(version("V1.0RC1"), version("1.0rc1"));
    }

    #[test]
    fn parse_errors() {
        for invalid in ["", "not-a-version", "1.", "1.0.", "1!", "1.0+", "1.0.*"] {
            assert!(
                Version::from_str(invalid).is_err(),
                "`{invalid}` should not parse"
            );
        }
        // A wildcard is fine as a pattern, not as a version.
        assert!(VersionPattern::from_str("1.0.*").unwrap().is_wildcard());
        assert!(VersionPattern::from_str("1.0a1.*").is_err());
    }

    #[test]
    fn round_trip() {
        for string in [
            "1.2.3",
            "1.0",
            "2!1.0a1",
            "1.0b2.post345.dev456",
            "1.0rc1",
            "1.0.post0",
            "1.0.dev1",
            "1.0+ubuntu.1",
            "5!1.2.3.4.5",
        ] {
            let parsed = version(string);
            assert_eq!(parsed.to_string(), string);
            assert_eq!(version(&parsed.to_string()), parsed);
        }
    }

    #[test]
    fn ordering() {
        let ordered = [
            "1.0.dev1",
            "1.0a1.dev1",
            "1.0a1",
            "1.0a2",
            "1.0b1",
            "1.0rc1",
            "1.0",
            "1.0+local",
            "1.0.post1",
            "1.1",
            "2!0.1",
        ];
        for window in ordered.windows(2) {
            let (lower, higher) = (version(window[0]), version(window[1]));
            assert!(lower < higher, "{lower} should be < {higher}");
        }
    }

    #[test]
    fn trailing_zeroes_are_insignificant() {
        assert_eq!(version("1.0"), version("1.0.0"));
        assert_ne!(version("1.0").to_string(), version("1.0.0").to_string());

        let mut hasher_a = std::collections::hash_map::DefaultHasher::new();
        let mut hasher_b = std::collections::hash_map::DefaultHasher::new();
        version("1.0").hash(&mut hasher_a);
        version("1.0.0").hash(&mut hasher_b);
        assert_eq!(hasher_a.finish(), hasher_b.finish());
    }

    #[test]
    fn trichotomy() {
        let samples = ["1.0", "1.0.0", "1.0a1", "1.0.post1", "1.1", "1.0+x"];
        for left in samples {
            for right in samples {
                let (left, right) = (version(left), version(right));
                let relations = [left < right, left == right, left > right];
                assert_eq!(
                    relations.iter().filter(|r| **r).count(),
                    1,
                    "{left} vs {right}"
                );
            }
        }
    }

    #[test]
    fn local_sorts_above_public() {
        assert!(version("1.0+anything") > version("1.0"));
        assert!(version("1.0+2") > version("1.0+abc"));
        assert!(version("1.0+abc.2") > version("1.0+abc"));
    }

    #[test]
    fn bumps() {
        assert_eq!(version("1.2.3").next_major().unwrap(), version("2.0.0"));
        assert_eq!(version("1.2.3").next_minor().unwrap(), version("1.3.0"));
        assert_eq!(version("1.2.3").next_patch().unwrap(), version("1.2.4"));
        assert_eq!(version("1").next_minor().unwrap(), version("1.1"));
        assert!(version("1.2.3a1").next_major().is_err());
        assert!(version("1.2.3.post1").next_patch().is_err());
        assert!(version("1.2.3.dev0").next_minor().is_err());
    }

    #[test]
    fn breaking() {
        assert_eq!(version("1.2.3").next_breaking(), version("2.0.0"));
        assert_eq!(version("0.2.3").next_breaking(), version("0.3.0"));
        assert_eq!(version("0.0.3").next_breaking(), version("0.0.4"));
        assert_eq!(version("0.0.0").next_breaking(), version("0.0.1"));
        assert_eq!(version("0.0").next_breaking(), version("0.1"));
        assert_eq!(version("0").next_breaking(), version("1"));
        assert_eq!(version("1.2.3b1").next_breaking(), version("2.0.0"));
    }
}
