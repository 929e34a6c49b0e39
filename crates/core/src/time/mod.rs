pub mod asx_market;
