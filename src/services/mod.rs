pub mod bom;
pub mod catalog;
pub mod lot_ledger;
pub mod work_orders;
