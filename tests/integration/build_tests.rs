use crate::fixture::{build, build_with, Fixture, RecordingFs};
use esmpack::core::BuildConfig;
use esmpack::PackError;
use std::sync::Arc;

fn leaflet_project() -> Fixture {
    let fx = Fixture::new();
    fx.write(
        "package.json",
        r#"{ "name": "leaflet-map", "peerDependencies": { "leaflet": "^1.9.4" } }"#,
    )
    .write(
        "src/leaflet_rollup.js",
        "import { foo } from './a.js';\nimport './style.css';\n\nexport { foo };\nexport const ready = true;\n",
    )
    .write(
        "src/a.js",
        "import L from 'leaflet';\n\nexport function foo(element) {\n  return L.map(element);\n}\n",
    )
    .write("src/style.css", ".leaflet-container {\n  height: 400px;\n}\n")
    .write(
        "node_modules/leaflet/package.json",
        r#"{ "name": "leaflet", "main": "dist/leaflet-src.js" }"#,
    )
    .write("node_modules/leaflet/dist/leaflet-src.js", "throw new Error('bundled');\n")
    .write("dist/old.js", "stale();\n");
    fx
}

#[tokio::test]
async fn test_leaflet_scenario() {
    let fx = leaflet_project();
    let fs = Arc::new(RecordingFs::default());
    let config = BuildConfig {
        minify: true,
        ..fx.config("./src/leaflet_rollup.js")
    };

    let result = build_with(config, fs.clone()).await.unwrap();

    assert!(!fx.exists("dist/old.js"), "clean step removes stale output");
    let js = fx.read("dist/bundle.js");
    assert!(js.starts_with("import "));
    assert!(js.contains("from\"leaflet\""));
    assert!(js.contains(".map("));
    assert!(js.contains("export{"));
    assert!(js.contains("foo") && js.contains("ready"));
    assert!(js.trim_end().ends_with("//# sourceMappingURL=bundle.js.map"));
    assert!(!js.contains("style.css"));

    assert_eq!(fx.read("dist/bundle.css"), ".leaflet-container {\n  height: 400px;\n}\n");
    assert!(fx.exists("dist/bundle.js.map"));

    assert_eq!(result.externals, vec!["leaflet"]);
    assert_eq!(result.modules.len(), 2);
    assert_eq!(result.output_files.len(), 3);

    let reads = fs.reads.lock();
    assert!(
        reads.iter().all(|p| !p.to_string_lossy().contains("node_modules/leaflet")),
        "external targets are never read: {:?}",
        reads
    );
}

#[tokio::test]
async fn test_unminified_bundle_inlines_both_modules() {
    let fx = leaflet_project();
    build(fx.config("./src/leaflet_rollup.js")).await.unwrap();

    let js = fx.read("dist/bundle.js");
    assert!(js.starts_with("import L from \"leaflet\";\n"));
    assert!(js.contains("function foo(element) {\n  return L.map(element);\n}"));
    assert!(js.contains("const ready = true;"));
    assert!(js.contains("export { foo, ready };"));
}

#[tokio::test]
async fn test_mutual_imports_build_once_each() {
    let fx = Fixture::new();
    fx.write("src/index.js", "import { isEven } from './a.js';\nexport { isEven };\n")
        .write(
            "src/a.js",
            "import { isOdd } from './b.js';\nexport function isEven(n) { return n === 0 ? true : isOdd(n - 1); }\n",
        )
        .write(
            "src/b.js",
            "import { isEven } from './a.js';\nexport function isOdd(n) { return n === 0 ? false : isEven(n - 1); }\n",
        );

    let result = build(fx.config("src/index.js")).await.unwrap();
    let js = fx.read("dist/bundle.js");

    assert_eq!(result.modules.len(), 3);
    assert_eq!(js.matches("function isEven(n)").count(), 1);
    assert_eq!(js.matches("function isOdd(n)").count(), 1);
    assert!(js.contains("isOdd(n - 1)"));
    assert!(js.contains("isEven(n - 1)"));
    assert!(!js.contains("import {"));
}

#[tokio::test]
async fn test_shared_module_appears_once() {
    let fx = Fixture::new();
    fx.write(
        "src/index.js",
        "import { left } from './left.js';\nimport { right } from './right.js';\nexport const both = left + right;\n",
    )
    .write("src/left.js", "import { shared } from './shared.js';\nexport const left = shared + 1;\n")
    .write("src/right.js", "import { shared } from './shared.js';\nexport const right = shared + 2;\n")
    .write("src/shared.js", "export const shared = 40;\n");

    let result = build(fx.config("src/index.js")).await.unwrap();
    let js = fx.read("dist/bundle.js");

    assert_eq!(result.modules.len(), 4);
    assert_eq!(js.matches("const shared = 40;").count(), 1);
    let shared_at = js.find("const shared").unwrap();
    assert!(shared_at < js.find("const left").unwrap());
    assert!(shared_at < js.find("const right").unwrap());
}

#[tokio::test]
async fn test_unminified_builds_are_byte_identical() {
    let fx = leaflet_project();
    fx.write("src/data.json", "{ \"zoom\": 13 }\n").write(
        "src/extra.js",
        "import data from './data.json';\nexport const zoom = data.zoom;\n",
    );
    fx.write(
        "src/leaflet_rollup.js",
        "import { foo } from './a.js';\nimport { zoom } from './extra.js';\nimport './style.css';\nexport { foo, zoom };\n",
    );

    build(fx.config("src/leaflet_rollup.js")).await.unwrap();
    let first_js = fx.read("dist/bundle.js");
    let first_map = fx.read("dist/bundle.js.map");
    let first_css = fx.read("dist/bundle.css");

    build(fx.config("src/leaflet_rollup.js")).await.unwrap();
    assert_eq!(fx.read("dist/bundle.js"), first_js);
    assert_eq!(fx.read("dist/bundle.js.map"), first_map);
    assert_eq!(fx.read("dist/bundle.css"), first_css);
}

#[tokio::test]
async fn test_unresolvable_import_leaves_no_output() {
    let fx = Fixture::new();
    fx.write("src/index.js", "import { gone } from './missing.js';\nexport { gone };\n");

    let err = build(fx.config("src/index.js")).await.unwrap_err();
    match err {
        PackError::Resolution { importer, specifier } => {
            assert!(importer.ends_with("src/index.js"));
            assert_eq!(specifier, "./missing.js");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.exists("dist/bundle.js"));
    assert!(!fx.exists("dist/bundle.js.map"));
}

#[tokio::test]
async fn test_syntax_error_is_transform_error() {
    let fx = Fixture::new();
    fx.write("src/index.js", "import { a } from './a.js';\nexport { a };\n")
        .write("src/a.js", "export const a = ;\n");

    let err = build(fx.config("src/index.js")).await.unwrap_err();
    match err {
        PackError::Transform { path, .. } => assert!(path.ends_with("src/a.js")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_sourcemap_can_be_disabled() {
    let fx = Fixture::new();
    fx.write("src/index.js", "export const a = 1;\n");
    let config = BuildConfig {
        sourcemap: false,
        ..fx.config("src/index.js")
    };

    let result = build(config).await.unwrap();
    assert_eq!(result.output_files.len(), 1);
    assert!(!fx.read("dist/bundle.js").contains("sourceMappingURL"));
    assert!(!fx.exists("dist/bundle.js.map"));
}

fn semicolon_free_project() -> Fixture {
    let fx = Fixture::new();
    fx.write("package.json", r#"{ "name": "asi", "type": "module" }"#)
        .write(
            "src/index.js",
            "import { items } from './a.js'\nimport './b.js'\nexport const count = items.length\n",
        )
        .write("src/a.js", "export const items = []\nitems.push('a')\n")
        .write("src/b.js", "(function () { globalThis.ran = true })()\n");
    fx
}

#[tokio::test]
async fn test_modules_without_semicolons_run_separately() {
    let fx = semicolon_free_project();
    build(fx.config("src/index.js")).await.unwrap();

    let js = fx.read("dist/bundle.js");
    assert!(js.contains("items.push('a');\n(function () {"));

    let printed = fx.run_node(
        "import { count } from './dist/bundle.js';\nconsole.log(JSON.stringify([count, globalThis.ran]));\n",
    );
    if let Some(printed) = printed {
        assert_eq!(printed, "[1,true]");
    }
}

#[tokio::test]
async fn test_minified_modules_without_semicolons_run_separately() {
    let fx = semicolon_free_project();
    let config = BuildConfig {
        minify: true,
        ..fx.config("src/index.js")
    };
    build(config).await.unwrap();

    let js = fx.read("dist/bundle.js");
    assert!(!js.contains("push(\"a\")(") && !js.contains("push('a')("));

    let printed = fx.run_node(
        "import { count } from './dist/bundle.js';\nconsole.log(JSON.stringify([count, globalThis.ran]));\n",
    );
    if let Some(printed) = printed {
        assert_eq!(printed, "[1,true]");
    }
}
