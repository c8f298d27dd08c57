mod admission;
mod cancel;
mod dedup;
mod failure;
mod helpers;
mod retry;
