pub mod scrap;
