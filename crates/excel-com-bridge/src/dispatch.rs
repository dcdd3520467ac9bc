//! Late-bound COM calls through IDispatch.
//!
//! Excel's object model is reached the way VBScript reaches it: look up a
//! member's DISPID by name, then `Invoke` it as a property get, a property
//! put or a method. Everything funnels through [`DispatchObject::invoke`].

#![cfg(windows)]

use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, CLSCTX_LOCAL_SERVER, DISPATCH_FLAGS,
                DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
            },
            Ole::DISPID_PROPERTYPUT,
            Variant::{
                VARIANT, VT_BOOL, VT_BSTR, VT_DATE, VT_DISPATCH, VT_EMPTY, VT_ERROR, VT_I2, VT_I4,
                VT_NULL, VT_R4, VT_R8,
            },
        },
    },
};

// VARIANT keeps its unions behind ManuallyDrop; fields are set with ptr::write.

pub fn variant_empty() -> VARIANT {
    VARIANT::default()
}

pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

pub fn variant_f64(val: f64) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_R8);
        ptr::write(&mut inner.Anonymous.dblVal, val);
        v
    }
}

pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(BSTR::from(val)));
        v
    }
}

pub fn variant_dispatch(obj: &DispatchObject) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_DISPATCH);
        ptr::write(
            &mut inner.Anonymous.pdispVal,
            ManuallyDrop::new(Some(obj.inner.clone())),
        );
        v
    }
}

/// A VARIANT read back from Excel, narrowed to what the bridge cares about.
pub enum Scalar {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Low word of the SCODE, e.g. 2007 for `#DIV/0!`
    Error(u16),
    Object(DispatchObject),
    Other(u16),
}

pub fn scalar(v: &VARIANT) -> Scalar {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        let anon = &v.Anonymous.Anonymous.Anonymous;
        if vt == VT_EMPTY || vt == VT_NULL {
            Scalar::Empty
        } else if vt == VT_BOOL {
            Scalar::Bool(anon.boolVal.0 != 0)
        } else if vt == VT_R8 || vt == VT_DATE {
            // dates come back as serial numbers
            Scalar::Number(anon.dblVal)
        } else if vt == VT_R4 {
            Scalar::Number(anon.fltVal as f64)
        } else if vt == VT_I4 {
            Scalar::Number(anon.lVal as f64)
        } else if vt == VT_I2 {
            Scalar::Number(anon.iVal as f64)
        } else if vt == VT_BSTR {
            Scalar::Text(anon.bstrVal.to_string())
        } else if vt == VT_ERROR {
            Scalar::Error((anon.scode as u32 & 0xFFFF) as u16)
        } else if vt == VT_DISPATCH {
            match &*anon.pdispVal {
                Some(disp) => Scalar::Object(DispatchObject { inner: disp.clone() }),
                None => Scalar::Empty,
            }
        } else {
            Scalar::Other(vt.0)
        }
    }
}

/// An IDispatch COM object.
#[derive(Clone)]
pub struct DispatchObject {
    inner: IDispatch,
}

impl DispatchObject {
    /// Instantiate a COM class by ProgID, e.g. `Excel.Application`.
    pub fn create_from_progid(progid: &str) -> Result<Self, String> {
        unsafe {
            let clsid = CLSIDFromProgID(&HSTRING::from(progid))
                .map_err(|e| format!("CLSIDFromProgID failed: {e}"))?;
            let inner: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| format!("CoCreateInstance failed for '{progid}': {e}"))?;
            Ok(Self { inner })
        }
    }

    fn dispid(&self, name: &str) -> Result<i32, String> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        unsafe {
            self.inner
                .GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, GetSystemDefaultLCID(), &mut dispid)
                .map_err(|e| format!("GetIDsOfNames('{name}') failed: {e}"))?;
        }
        Ok(dispid)
    }

    /// Invoke `name` with arguments in natural order.
    fn invoke(&self, name: &str, flags: DISPATCH_FLAGS, args: &[VARIANT]) -> Result<VARIANT, String> {
        let dispid = self.dispid(name)?;
        // DISPPARAMS wants arguments last to first
        let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let mut named = [DISPID_PROPERTYPUT];
        let is_put = flags == DISPATCH_PROPERTYPUT;
        let params = DISPPARAMS {
            rgvarg: if reversed.is_empty() {
                ptr::null_mut()
            } else {
                reversed.as_mut_ptr()
            },
            rgdispidNamedArgs: if is_put { named.as_mut_ptr() } else { ptr::null_mut() },
            cArgs: reversed.len() as u32,
            cNamedArgs: u32::from(is_put),
        };
        let mut result = VARIANT::default();
        let mut except = EXCEPINFO::default();
        unsafe {
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    flags,
                    &params,
                    if is_put { None } else { Some(&mut result) },
                    Some(&mut except),
                    None,
                )
                .map_err(|e| invoke_error(e, &except, name))?;
        }
        Ok(result)
    }

    /// `obj.Name` or `obj.Name(args...)` as a property read.
    pub fn get(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, args)
    }

    /// `obj.Name = value`
    pub fn put(&self, name: &str, value: VARIANT) -> Result<(), String> {
        self.invoke(name, DISPATCH_PROPERTYPUT, &[value]).map(drop)
    }

    /// `obj.Name(args...)` as a method call.
    pub fn call(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    /// A property read that must produce an object.
    pub fn object(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        into_object(self.get(name, args)?, name)
    }

    /// A method call that must produce an object.
    pub fn call_object(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        into_object(self.call(name, args)?, name)
    }

    pub fn text(&self, name: &str) -> Result<String, String> {
        match scalar(&self.get(name, &[])?) {
            Scalar::Text(s) => Ok(s),
            Scalar::Empty => Ok(String::new()),
            Scalar::Number(n) => Ok(n.to_string()),
            _ => Err(format!("'{name}' is not text")),
        }
    }

    pub fn count(&self, name: &str) -> Result<u32, String> {
        match scalar(&self.get(name, &[])?) {
            Scalar::Number(n) if n >= 0.0 => Ok(n as u32),
            _ => Err(format!("'{name}' is not a count")),
        }
    }
}

fn into_object(v: VARIANT, member: &str) -> Result<DispatchObject, String> {
    match scalar(&v) {
        Scalar::Object(obj) => Ok(obj),
        Scalar::Empty => Err(format!("'{member}' returned nothing")),
        Scalar::Error(code) => Err(format!("'{member}' returned error {code}")),
        _ => Err(format!("'{member}' did not return an object")),
    }
}

fn invoke_error(err: windows::core::Error, except: &EXCEPINFO, member: &str) -> String {
    if err.code().0 as u32 != DISP_E_EXCEPTION.0 as u32 {
        return format!("Invoke('{member}') failed: {err}");
    }
    // Excel's own description is what callers want to see
    if except.bstrDescription.is_empty() {
        format!("COM exception in '{member}'")
    } else {
        except.bstrDescription.to_string()
    }
}
