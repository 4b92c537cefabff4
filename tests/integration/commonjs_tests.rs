use crate::fixture::{build, Fixture};

fn project_with_legacy_package() -> Fixture {
    let fx = Fixture::new();
    fx.write(
        "node_modules/legacy-geo/package.json",
        r#"{ "name": "legacy-geo", "main": "lib/index.js" }"#,
    )
    .write(
        "node_modules/legacy-geo/lib/index.js",
        "var units = require('./units');\nexports.distance = function (a, b) { return Math.abs(a - b) * units.scale; };\nexports.unit = units.name;\n",
    )
    .write(
        "node_modules/legacy-geo/lib/units.js",
        "module.exports = { name: 'km', scale: 1 };\n",
    );
    fx
}

#[tokio::test]
async fn test_default_and_named_imports_from_commonjs_package() {
    let fx = project_with_legacy_package();
    fx.write(
        "src/index.js",
        "import geo, { distance } from 'legacy-geo';\nexport const d = distance(1, 4);\nexport const unit = geo.unit;\n",
    );

    let result = build(fx.config("src/index.js")).await.unwrap();
    let js = fx.read("dist/bundle.js");

    assert_eq!(result.modules.len(), 3);
    assert!(result.externals.is_empty());
    assert_eq!(js.matches("(function (module, exports) {").count(), 2);
    assert!(js.contains(".exports.distance(1, 4)"));
    assert!(!js.contains("require("));
    assert!(!js.contains("from 'legacy-geo'"));

    let units_at = js.find("name: 'km'").unwrap();
    let index_at = js.find("exports.distance = function").unwrap();
    assert!(units_at < index_at, "required module runs first");
}

#[tokio::test]
async fn test_require_of_external_becomes_import() {
    let fx = Fixture::new();
    fx.write(
        "package.json",
        r#"{ "name": "app", "peerDependencies": { "leaflet": "^1.9.4" } }"#,
    )
    .write("src/index.js", "import plugin from './plugin.cjs';\nexport default plugin;\n")
    .write(
        "src/plugin.cjs",
        "var L = require('leaflet');\nmodule.exports = function (map) { return L.marker(map.getCenter()); };\n",
    );

    let result = build(fx.config("src/index.js")).await.unwrap();
    let js = fx.read("dist/bundle.js");

    assert_eq!(result.externals, vec!["leaflet"]);
    assert!(js.starts_with("import "));
    assert!(js.lines().next().unwrap().ends_with("from \"leaflet\";"));
    assert!(js.contains("L.marker(map.getCenter())"));
    assert!(js.contains(" as default };"));
}

#[tokio::test]
async fn test_dynamic_require_is_reported_as_warning() {
    let fx = Fixture::new();
    fx.write("src/index.js", "import load from './loader.cjs';\nexport { load };\n")
        .write(
            "src/loader.cjs",
            "module.exports = function (name) { return require(name); };\n",
        );

    let result = build(fx.config("src/index.js")).await.unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("loader.cjs"));
    assert!(fx.read("dist/bundle.js").contains("require(name)"));
}

#[tokio::test]
async fn test_star_exports_mixing_commonjs_and_esm() {
    let fx = Fixture::new();
    fx.write("package.json", r#"{ "name": "mixed", "type": "module" }"#)
        .write(
            "src/index.js",
            "export * from './legacy.cjs';\nexport * from './modern.js';\n",
        )
        .write("src/legacy.cjs", "exports.a = 'from-cjs';\n")
        .write("src/modern.js", "export const fromEsm = 'from-esm';\n");

    build(fx.config("src/index.js")).await.unwrap();
    let js = fx.read("dist/bundle.js");

    assert!(js.contains("const fromEsm = 'from-esm';"));
    assert!(js.contains("export { __export_a as a, fromEsm };"));
    assert!(!js.contains("exports.fromEsm"));

    let printed = fx.run_node(
        "import * as ns from './dist/bundle.js';\nconsole.log(JSON.stringify([ns.a, ns.fromEsm]));\n",
    );
    if let Some(printed) = printed {
        assert_eq!(printed, r#"["from-cjs","from-esm"]"#);
    }
}
