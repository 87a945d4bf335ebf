mod disasm;
mod edits;
mod fat;
mod hex_range;
mod layout;
mod malformed;
mod symbols;
mod timeouts;
