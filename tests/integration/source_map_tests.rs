use crate::fixture::{build, Fixture};
use esmpack::core::BuildConfig;
use sourcemap::SourceMap;

fn project() -> Fixture {
    let fx = Fixture::new();
    fx.write(
        "src/index.js",
        "import { foo } from './a.js';\n\nexport const el = foo('map');\n",
    )
    .write(
        "src/a.js",
        "// helpers\n\nexport function foo(element) {\n  return document.getElementById(element);\n}\n",
    );
    fx
}

fn locate(code: &str, needle: &str) -> (u32, u32) {
    for (line, text) in code.lines().enumerate() {
        if let Some(col) = text.find(needle) {
            return (line as u32, col as u32);
        }
    }
    panic!("{needle:?} not found in bundle:\n{code}");
}

fn load_map(fx: &Fixture) -> SourceMap {
    SourceMap::from_slice(fx.read("dist/bundle.js.map").as_bytes()).unwrap()
}

#[tokio::test]
async fn test_unminified_positions_map_to_original_module() {
    let fx = project();
    build(fx.config("src/index.js")).await.unwrap();

    let js = fx.read("dist/bundle.js");
    let map = load_map(&fx);
    let (line, col) = locate(&js, "return document");

    let token = map.lookup_token(line, col).unwrap();
    assert_eq!(token.get_source(), Some("src/a.js"));
    assert_eq!((token.get_src_line(), token.get_src_col()), (3, 2));

    let (line, col) = locate(&js, "const el");
    let token = map.lookup_token(line, col).unwrap();
    assert_eq!(token.get_source(), Some("src/index.js"));
    assert_eq!(token.get_src_line(), 2);
}

#[tokio::test]
async fn test_minified_positions_map_to_original_module() {
    let fx = project();
    let config = BuildConfig {
        minify: true,
        ..fx.config("src/index.js")
    };
    build(config).await.unwrap();

    let js = fx.read("dist/bundle.js");
    assert!(!js.contains("// helpers"));
    let map = load_map(&fx);
    let (line, col) = locate(&js, "document.getElementById");

    let token = map.lookup_token(line, col).unwrap();
    assert_eq!(token.get_source(), Some("src/a.js"));
    assert_eq!(token.get_src_line(), 3);
}

#[tokio::test]
async fn test_map_embeds_sources_and_names_the_bundle() {
    let fx = project();
    build(fx.config("src/index.js")).await.unwrap();

    let map = load_map(&fx);
    assert_eq!(map.get_file(), Some("bundle.js"));
    let sources: Vec<&str> = map.sources().collect();
    assert_eq!(sources, vec!["src/a.js", "src/index.js"]);
    assert_eq!(
        map.get_source_contents(0),
        Some("// helpers\n\nexport function foo(element) {\n  return document.getElementById(element);\n}\n")
    );
}
