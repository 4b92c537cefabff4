use crate::fixture::{build, Fixture};
use esmpack::core::BuildConfig;
use esmpack::PackError;

#[tokio::test]
async fn test_stylesheets_are_deduplicated_in_discovery_order() {
    let fx = Fixture::new();
    fx.write(
        "src/index.js",
        "import './a.js';\nimport './main.css';\nimport './shared.css';\nexport const ok = 1;\n",
    )
    .write("src/a.js", "import './shared.css';\nexport const a = 1;\n")
    .write("src/shared.css", ".shared { margin: 0; }\n")
    .write("src/main.css", ".main { color: red; }\n");

    let result = build(fx.config("src/index.js")).await.unwrap();

    assert_eq!(
        fx.read("dist/bundle.css"),
        ".shared { margin: 0; }\n.main { color: red; }\n"
    );
    assert_eq!(result.stylesheets.len(), 2);
    assert!(result.stylesheets[0].ends_with("src/shared.css"));
    let js = fx.read("dist/bundle.js");
    assert!(!js.contains(".css"));
}

#[tokio::test]
async fn test_nested_imports_are_inlined() {
    let fx = Fixture::new();
    fx.write("src/index.js", "import './theme.css';\nexport const ok = 1;\n")
        .write(
            "src/theme.css",
            "@import './base.css';\n@import url(print.css) print;\n.theme { color: blue; }\n",
        )
        .write("src/base.css", ".base { box-sizing: border-box; }\n")
        .write("src/print.css", ".no-print { display: none; }\n");

    build(fx.config("src/index.js")).await.unwrap();

    assert_eq!(
        fx.read("dist/bundle.css"),
        ".base { box-sizing: border-box; }\n@media print {\n.no-print { display: none; }\n}\n.theme { color: blue; }\n"
    );
}

#[tokio::test]
async fn test_commonjs_require_of_stylesheet_is_extracted() {
    let fx = Fixture::new();
    fx.write(
        "src/index.js",
        "import widget from './widget.cjs';\nexport const ok = widget.ready;\n",
    )
    .write(
        "src/widget.cjs",
        "require('./widget.css');\nmodule.exports = { ready: true };\n",
    )
    .write("src/widget.css", ".widget { display: block; }\n");

    let result = build(fx.config("src/index.js")).await.unwrap();

    assert_eq!(fx.read("dist/bundle.css"), ".widget { display: block; }\n");
    assert_eq!(result.stylesheets.len(), 1);
    assert!(!fx.read("dist/bundle.js").contains("widget.css"));
}

#[tokio::test]
async fn test_no_stylesheets_means_no_css_artifact() {
    let fx = Fixture::new();
    fx.write("src/index.js", "export const ok = 1;\n");

    build(fx.config("src/index.js")).await.unwrap();
    assert!(!fx.exists("dist/bundle.css"));
}

#[tokio::test]
async fn test_stylesheets_minified_on_request() {
    let fx = Fixture::new();
    fx.write("src/index.js", "import './a.css';\nexport const ok = 1;\n")
        .write("src/a.css", ".leaflet-map {\n  height: 100%;\n}\n");
    let config = BuildConfig {
        minify_css: true,
        ..fx.config("src/index.js")
    };

    build(config).await.unwrap();
    assert_eq!(fx.read("dist/bundle.css"), ".leaflet-map{height:100%}\n");
}

#[tokio::test]
async fn test_invalid_stylesheet_fails_the_build() {
    let fx = Fixture::new();
    fx.write("src/index.js", "import './bad.css';\nexport const ok = 1;\n")
        .write("src/bad.css", "..broken { color: red; }\n");

    let err = build(fx.config("src/index.js")).await.unwrap_err();
    match err {
        PackError::Transform { path, .. } => assert!(path.ends_with("src/bad.css")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.exists("dist/bundle.css"));
}
