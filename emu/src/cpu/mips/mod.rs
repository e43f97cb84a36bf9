#[allow(clippy::enum_glob_use)]
#[allow(clippy::unreadable_literal)]
pub mod instructions;

#[allow(clippy::enum_glob_use)]
pub mod opcode;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::enum_glob_use)]
#[allow(clippy::too_many_lines)]
mod operations;
