pub mod columns;
pub mod locus;
pub mod record;
