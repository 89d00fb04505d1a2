// Shoebox constants

// Backend capacity. Crossing this count migrates the library between the
// flat JSON file and the document store.
pub const MAX_ITEM_COUNT: usize = 10_000;

// Filesystem watching
pub const DEBOUNCE_WINDOW_MS: u64 = 600;
pub const DEBOUNCE_MAX_DELAY_FACTOR: u32 = 10;
pub const WATCH_DEPTH: usize = 1;

// Files under the user-data directory
pub const IMAGES_JSON_FILENAME: &str = "images.json";
pub const DB_FILENAME: &str = "library.db";
pub const SETTINGS_FILENAME: &str = "settings.json";

// directories::ProjectDirs parameters
pub const APP_QUALIFIER: &str = "com";
pub const APP_ORGANIZATION: &str = "shoebox";
pub const APP_NAME: &str = "shoebox";

// Content-derived id length (hex chars = 2x bytes)
pub const CONTENT_ID_BYTES: usize = 8;

// Image extensions (primary supported formats)
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

// Video extensions
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "webm"];

// Display aspect ratios a record snaps to
pub const DISPLAY_RATIOS: [&str; 5] = ["4:3", "16:9", "1:1", "3:4", "9:16"];
