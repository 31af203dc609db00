//! Bit-flag sets attached to apps and to catalog operations.

use bitflags::bitflags;

bitflags! {
    /// Policy markers that change how an app is treated.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Quirks: u64 {
        /// Part of the base system; removal is refused.
        const COMPULSORY = 1 << 0;
        /// Never show this app anywhere.
        const HIDE_EVERYWHERE = 1 << 1;
        /// No launch entry point exists.
        const NOT_LAUNCHABLE = 1 << 2;
        /// Publisher identity was verified by the origin.
        const DEVELOPER_VERIFIED = 1 << 3;
        /// Comes from a development or nightly repository.
        const FROM_DEVELOPMENT_REPOSITORY = 1 << 4;
        /// Subject to parental filtering.
        const PARENTAL_FILTER = 1 << 5;
        /// A local file that also carries its own repository.
        const LOCAL_HAS_REPOSITORY = 1 << 6;
        /// Install or removal only takes effect after reboot.
        const NEEDS_REBOOT = 1 << 7;
        /// At least one backend source is attached.
        const HAS_SOURCE = 1 << 8;
        /// Placeholder app to be materialized by a later refine.
        const IS_WILDCARD = 1 << 9;
        /// Exclude from search results.
        const HIDE_FROM_SEARCH = 1 << 10;
        /// Reviews are not applicable (e.g. runtimes).
        const NOT_REVIEWABLE = 1 << 11;
        /// Never show version history.
        const NO_VERSION_HISTORY = 1 << 12;
    }
}

bitflags! {
    /// Quality markers used for ranking and presentation only.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Kudos: u64 {
        /// Component ships search keywords.
        const HAS_KEYWORDS = 1 << 0;
        /// Translated into the user's language.
        const MY_LANGUAGE = 1 << 1;
        /// Released within the last year.
        const RECENT_RELEASE = 1 << 2;
        /// Curated by the distribution.
        const FEATURED_RECOMMENDED = 1 << 3;
        /// Runs confined in a sandbox.
        const SANDBOXED = 1 << 4;
        /// Ships an icon usable on high-density displays.
        const HI_DPI_ICON = 1 << 5;
        /// Has at least one screenshot.
        const HAS_SCREENSHOTS = 1 << 6;
    }
}

bitflags! {
    /// Fields a refine pass must populate. Expensive extractions only run
    /// when asked for.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RefineFlags: u64 {
        /// Resolve the component id and unique id.
        const REQUIRE_ID = 1 << 0;
        /// Resolve the origin name.
        const REQUIRE_ORIGIN = 1 << 1;
        /// Resolve the origin hostname.
        const REQUIRE_ORIGIN_HOSTNAME = 1 << 2;
        /// Resolve the user-visible origin label.
        const REQUIRE_ORIGIN_UI = 1 << 3;
        /// Extract the long description.
        const REQUIRE_DESCRIPTION = 1 << 4;
        /// Extract the project license.
        const REQUIRE_LICENSE = 1 << 5;
        /// Resolve installed/download sizes.
        const REQUIRE_SIZE = 1 << 6;
        /// Resolve data/cache sizes.
        const REQUIRE_SIZE_DATA = 1 << 7;
        /// Resolve the current version.
        const REQUIRE_VERSION = 1 << 8;
        /// Build the release history.
        const REQUIRE_HISTORY = 1 << 9;
        /// Attach addon components.
        const REQUIRE_ADDONS = 1 << 10;
        /// Extract screenshots and videos.
        const REQUIRE_SCREENSHOTS = 1 << 11;
        /// Extract icon descriptors.
        const REQUIRE_ICON = 1 << 12;
        /// Extract upstream URLs.
        const REQUIRE_URL = 1 << 13;
        /// Extract category memberships.
        const REQUIRE_CATEGORIES = 1 << 14;
        /// Resolve provenance (compulsory/source flags).
        const REQUIRE_PROVENANCE = 1 << 15;
        /// Extract sandbox permissions and relations.
        const REQUIRE_PERMISSIONS = 1 << 16;
        /// Build pending-update details markup.
        const REQUIRE_UPDATE_DETAILS = 1 << 17;
        /// Compute derived kudos.
        const REQUIRE_KUDOS = 1 << 18;
        /// Resolve the aggregate review rating.
        const REQUIRE_RATING = 1 << 19;
        /// Resolve per-star review counts.
        const REQUIRE_REVIEW_RATINGS = 1 << 20;
        /// Fetch review texts.
        const REQUIRE_REVIEWS = 1 << 21;
        /// Attach related apps.
        const REQUIRE_RELATED = 1 << 22;
        /// Resolve the runtime dependency.
        const REQUIRE_RUNTIME = 1 << 23;
        /// Resolve any post-install setup action.
        const REQUIRE_SETUP_ACTION = 1 << 24;
        /// Extract the developer name.
        const REQUIRE_DEVELOPER_NAME = 1 << 25;
        /// Extract the project group.
        const REQUIRE_PROJECT_GROUP = 1 << 26;
    }
}

bitflags! {
    /// How [`crate::app::AppList::filter_duplicates`] collapses entries.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DedupeFlags: u64 {
        /// Prefer the entry whose owning plugin has higher priority.
        const PRIORITY = 1 << 0;
        /// Key on the component id alone instead of the full unique id.
        const KEY_ID_ONLY = 1 << 1;
        /// Include the first source name in the key.
        const KEY_SOURCE_NAME = 1 << 2;
        /// Prefer the installed entry over an available duplicate.
        const MATCH_INSTALLED = 1 << 3;
    }
}

bitflags! {
    /// Sandbox permissions surfaced on an app.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Permissions: u64 {
        /// Unrestricted network access.
        const NETWORK = 1 << 0;
        /// Full filesystem access.
        const FILESYSTEM_FULL = 1 << 1;
        /// Read-only filesystem access.
        const FILESYSTEM_READ = 1 << 2;
        /// Full home directory access.
        const HOME_FULL = 1 << 3;
        /// Read-only home directory access.
        const HOME_READ = 1 << 4;
        /// Raw device access.
        const DEVICES = 1 << 5;
        /// System bus access.
        const SYSTEM_BUS = 1 << 6;
        /// Session bus access.
        const SESSION_BUS = 1 << 7;
        /// Legacy X11 windowing.
        const X11 = 1 << 8;
        /// Can escape its sandbox.
        const ESCAPE_SANDBOX = 1 << 9;
        /// Can change system settings.
        const SETTINGS = 1 << 10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quirks_are_set_like() {
        let mut q = Quirks::empty();
        q |= Quirks::IS_WILDCARD;
        assert!(q.contains(Quirks::IS_WILDCARD));
        q.remove(Quirks::IS_WILDCARD);
        assert!(q.is_empty());
    }

    #[test]
    fn refine_flags_compose() {
        let f = RefineFlags::REQUIRE_ID | RefineFlags::REQUIRE_ORIGIN;
        assert!(f.contains(RefineFlags::REQUIRE_ID));
        assert!(!f.contains(RefineFlags::REQUIRE_ICON));
    }
}
