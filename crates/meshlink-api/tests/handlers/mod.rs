mod basic;
mod commands;
