mod build_tests;
mod commonjs_tests;
mod css_tests;
mod fixture;
mod source_map_tests;
