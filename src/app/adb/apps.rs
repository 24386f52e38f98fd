use crate::app::models::AndroidApp;

/// Parses `pm list packages -f`, whose lines look like
/// `package:/data/app/~~x/com.example-1/base.apk=com.example`. Lines without
/// a path (`package:com.example`, from plain `pm list packages`) are kept with
/// no APK path.
pub fn parse_pm_list_packages_output(output: &str) -> Vec<AndroidApp> {
    let mut apps: Vec<AndroidApp> = output
        .lines()
        .filter_map(|raw| {
            let line = raw.trim();
            let payload = line.strip_prefix("package:")?.trim();
            if payload.is_empty() {
                return None;
            }
            let app = match payload.rsplit_once('=') {
                Some((apk_path, package_name)) => {
                    let package_name = package_name.trim();
                    if package_name.is_empty() {
                        return None;
                    }
                    let apk_path = apk_path.trim().to_string();
                    AndroidApp {
                        package_name: package_name.to_string(),
                        is_system: is_system_path(&apk_path),
                        apk_path: Some(apk_path),
                    }
                }
                None => AndroidApp::from_package(payload),
            };
            Some(app)
        })
        .collect();
    apps.sort_by(|a, b| a.package_name.cmp(&b.package_name));
    apps.dedup_by(|a, b| a.package_name == b.package_name);
    apps
}

fn is_system_path(path: &str) -> bool {
    ["/system/", "/product/", "/vendor/", "/system_ext/", "/apex/"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}
