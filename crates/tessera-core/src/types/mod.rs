pub mod directory;
pub mod sealer;
pub mod status;

pub use directory::NodeDirectory;
pub use sealer::SealerList;
pub use status::RawPrepareStatus;
