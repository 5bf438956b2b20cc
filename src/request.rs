//! Method Channel Requests
//!
//! The closed set of calls the bridge answers, each with typed arguments.

use installed_apps_core::{BridgeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A raw call as it arrives on the method channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    /// Echoed back on the response when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            method: method.into(),
            arguments,
        }
    }
}

fn parse_args<T: DeserializeOwned>(method: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| BridgeError::InvalidArguments(format!("{}: {}", method, e)))
}

fn default_true() -> bool {
    true
}

/// An explicit `null` reads as the type's default
fn or_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn or_true<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListAppsArgs {
    #[serde(default = "default_true", deserialize_with = "or_true")]
    pub exclude_system_apps: bool,
    #[serde(default, deserialize_with = "or_default")]
    pub with_icon: bool,
    #[serde(default, deserialize_with = "or_default")]
    pub package_name_prefix: String,
    #[serde(default, deserialize_with = "or_default")]
    pub platform_type: String,
}

/// Arguments naming a single package
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageArgs {
    #[serde(default)]
    pub package_name: Option<String>,
}

impl PackageArgs {
    pub fn package_name(&self) -> &str {
        self.package_name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppInfoArgs {
    #[serde(default, deserialize_with = "or_default")]
    pub package_name: String,
    #[serde(default, deserialize_with = "or_default")]
    pub platform_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToastArgs {
    #[serde(default, deserialize_with = "or_default")]
    pub message: String,
    #[serde(default = "default_true", deserialize_with = "or_true")]
    pub short_length: bool,
}

/// Every request the method channel understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ListApps(ListAppsArgs),
    LaunchApp(PackageArgs),
    OpenSettings(PackageArgs),
    Toast(ToastArgs),
    GetAppInfo(AppInfoArgs),
    IsSystemApp(PackageArgs),
    UninstallApp(PackageArgs),
    IsAppInstalled(PackageArgs),
    ExtractApk(PackageArgs),
}

impl Request {
    /// Typed request for `call`; `Ok(None)` for a method the bridge does not know
    pub fn from_call(call: &MethodCall) -> Result<Option<Self>> {
        let args = match &call.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        let method = call.method.as_str();
        let request = match method {
            "getInstalledApps" => Request::ListApps(parse_args(method, args)?),
            "startApp" => Request::LaunchApp(parse_args(method, args)?),
            "openSettings" => Request::OpenSettings(parse_args(method, args)?),
            "toast" => Request::Toast(parse_args(method, args)?),
            "getAppInfo" => Request::GetAppInfo(parse_args(method, args)?),
            "isSystemApp" => Request::IsSystemApp(parse_args(method, args)?),
            "uninstallApp" => Request::UninstallApp(parse_args(method, args)?),
            "isAppInstalled" => Request::IsAppInstalled(parse_args(method, args)?),
            "extractApk" => Request::ExtractApk(parse_args(method, args)?),
            _ => return Ok(None),
        };

        Ok(Some(request))
    }

    /// Wire name of the method
    pub fn method(&self) -> &'static str {
        match self {
            Request::ListApps(_) => "getInstalledApps",
            Request::LaunchApp(_) => "startApp",
            Request::OpenSettings(_) => "openSettings",
            Request::Toast(_) => "toast",
            Request::GetAppInfo(_) => "getAppInfo",
            Request::IsSystemApp(_) => "isSystemApp",
            Request::UninstallApp(_) => "uninstallApp",
            Request::IsAppInstalled(_) => "isAppInstalled",
            Request::ExtractApk(_) => "extractApk",
        }
    }
}

/// Outcome of one method call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    Success { result: Value },
    Error { code: String, message: String },
    NotImplemented,
}

impl MethodResponse {
    pub fn success(result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => MethodResponse::Success { result },
            Err(e) => MethodResponse::from_error(&BridgeError::Json(e)),
        }
    }

    pub fn empty() -> Self {
        MethodResponse::Success { result: Value::Null }
    }

    pub fn from_error(error: &BridgeError) -> Self {
        MethodResponse::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_apps_defaults() {
        let call = MethodCall::new("getInstalledApps", Value::Null);
        let request = Request::from_call(&call).unwrap().unwrap();
        assert_eq!(
            request,
            Request::ListApps(ListAppsArgs {
                exclude_system_apps: true,
                with_icon: false,
                package_name_prefix: String::new(),
                platform_type: String::new(),
            })
        );
        assert_eq!(request.method(), "getInstalledApps");
    }

    #[test]
    fn test_typed_arguments() {
        let call = MethodCall::new("toast", json!({"message": "hi", "short_length": false}));
        assert_eq!(
            Request::from_call(&call).unwrap(),
            Some(Request::Toast(ToastArgs {
                message: "hi".into(),
                short_length: false
            }))
        );

        let call = MethodCall::new("startApp", json!({"package_name": null}));
        assert_eq!(
            Request::from_call(&call).unwrap(),
            Some(Request::LaunchApp(PackageArgs { package_name: None }))
        );
    }

    #[test]
    fn test_null_arguments_fall_back_to_defaults() {
        let call = MethodCall::new(
            "getInstalledApps",
            json!({"exclude_system_apps": null, "with_icon": null, "package_name_prefix": null, "platform_type": null}),
        );
        assert_eq!(
            Request::from_call(&call).unwrap(),
            Some(Request::ListApps(ListAppsArgs {
                exclude_system_apps: true,
                with_icon: false,
                package_name_prefix: String::new(),
                platform_type: String::new(),
            }))
        );

        let call = MethodCall::new("getAppInfo", json!({"package_name": "com.a", "platform_type": null}));
        assert_eq!(
            Request::from_call(&call).unwrap(),
            Some(Request::GetAppInfo(AppInfoArgs {
                package_name: "com.a".into(),
                platform_type: String::new(),
            }))
        );

        let call = MethodCall::new("toast", json!({"message": null, "short_length": null}));
        assert_eq!(
            Request::from_call(&call).unwrap(),
            Some(Request::Toast(ToastArgs {
                message: String::new(),
                short_length: true
            }))
        );
    }

    #[test]
    fn test_unknown_method_is_not_an_error() {
        let call = MethodCall::new("rebootDevice", json!({}));
        assert_eq!(Request::from_call(&call).unwrap(), None);
    }

    #[test]
    fn test_bad_argument_types() {
        let call = MethodCall::new("getInstalledApps", json!({"with_icon": "yes"}));
        let err = Request::from_call(&call).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENTS");
    }

    #[test]
    fn test_response_wire_form() {
        assert_eq!(
            serde_json::to_value(MethodResponse::success(true)).unwrap(),
            json!({"status": "success", "result": true})
        );
        assert_eq!(
            serde_json::to_value(MethodResponse::NotImplemented).unwrap(),
            json!({"status": "not_implemented"})
        );
    }
}
