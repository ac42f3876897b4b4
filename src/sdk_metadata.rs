/// Name and version of the host SDK built on top of this core.
///
/// Used for SDK-version gating of campaigns and attached to exposure events as
/// metadata.
#[derive(Debug, Clone, Copy)]
pub struct SdkMetadata {
    /// SDK name. Usually, the host platform name.
    pub name: &'static str,
    /// Version of the host SDK, a semver string.
    pub version: &'static str,
}

impl SdkMetadata {
    /// Parse [`SdkMetadata::version`] as semver.
    ///
    /// Returns `None` if the host SDK reported a non-semver version, in which
    /// case version-gated campaigns are filtered out (fail-closed).
    pub(crate) fn semver(&self) -> Option<semver::Version> {
        semver::Version::parse(self.version).ok()
    }
}
