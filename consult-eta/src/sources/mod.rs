pub mod file_board;
pub mod relay_board;

pub use file_board::FileBoardSource;
pub use relay_board::RelayBoardSource;
