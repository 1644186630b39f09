pub mod url_utils;
