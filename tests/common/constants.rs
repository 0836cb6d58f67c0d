//! Test constants shared by the integration tests.

// =============================================================================
// Stub Hosts
// =============================================================================

/// Host serving stub movie pages.
pub const MOVIE_HOST: &str = "movies.stub.test";

/// Host serving a second source of movie pages, for cross-site matching.
pub const MIRROR_HOST: &str = "mirror.stub.test";

/// Host serving stub TV show pages.
pub const SHOW_HOST: &str = "shows.stub.test";

/// Host serving stub TV season pages.
pub const SEASON_HOST: &str = "seasons.stub.test";

// =============================================================================
// Identifiers
// =============================================================================

pub const IMDB_ALIEN: &str = "tt0078748";

pub const COVER_URL: &str = "https://img.stub.test/covers/alien.png";
