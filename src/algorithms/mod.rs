pub mod dcsc;
