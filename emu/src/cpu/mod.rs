pub mod cop0;
pub mod exception;

#[allow(clippy::cast_possible_truncation)]
pub mod hardware;
pub mod mips;

#[allow(clippy::module_name_repetitions)]
pub mod r4300;
pub mod registers;
